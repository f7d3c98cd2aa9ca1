//! Lays a byte payload across a file's main header page and however many
//! fragment pages follow it. A public loop slices the caller's buffer into
//! page-sized chunks and delegates each physical page to a private helper
//! that builds the header+payload buffer and writes it through the
//! wear-retry wrapper, generalized from a flat CRC-type-keyed record to this
//! header+CRC page format.

use crate::codec::{
    decode_fragment_header, encode_fragment_header, header_total_size, FillState, Header,
    Location, CRC_SIZE, FRAGMENT_HEADER_SIZE, UNINITIALISED,
};
use crate::config::Config;
use crate::crc::CrcProvider;
use crate::device::{BlockDevice, PageIo};
use crate::error::Result;
use crate::relocate::{self, Verified};
use crate::root::RootManager;
use crate::walk::Predecessor;

/// Payload bytes that fit on a main header's own page.
pub fn main_capacity(cfg: &Config) -> usize {
    cfg.page_size as usize - header_total_size(cfg.max_file_name)
}

/// Payload bytes that fit on a fragment page.
pub fn fragment_capacity(cfg: &Config) -> usize {
    cfg.page_size as usize - FRAGMENT_HEADER_SIZE
}

fn ceil_div(n: usize, d: usize) -> usize {
    if n == 0 {
        0
    } else {
        (n + d - 1) / d
    }
}

/// The on-media `file_size` for `n` payload bytes: header overhead, the
/// bytes themselves, plus one `FRAGMENT_HEADER_SIZE` per fragment page the
/// payload spills into.
pub fn data_file_size(cfg: &Config, n: usize) -> u32 {
    let fragments = ceil_div(n, fragment_capacity(cfg).max(1));
    (header_total_size(cfg.max_file_name) + n + fragments * FRAGMENT_HEADER_SIZE) as u32
}

/// Splits `data` into the main page's chunk followed by however many
/// fragment-sized chunks the rest needs. Always yields at least one chunk
/// (possibly empty), since the main page is written even for an empty file.
/// Advances the persisted cursor past `last_loc` if the chain just written
/// extended past it; never moves it backward (a write filling a gap left by
/// an earlier remove must not un-reclaim later space).
fn bump_cursor_past<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, root: &mut RootManager, last_loc: Location) -> Result<()> {
    let candidate = Location::new(last_loc.page + 1, 0);
    let offset = candidate.to_offset(cfg.page_size);
    if offset > root.next_open_byte {
        root.advance_cursor(io, cfg, candidate)?;
    }
    Ok(())
}

fn chunk_payload(cfg: &Config, data: &[u8]) -> Vec<&[u8]> {
    let mut chunks = Vec::new();
    let mcap = main_capacity(cfg);
    let split = data.len().min(mcap);
    let (first, mut rest) = data.split_at(split);
    chunks.push(first);

    let fcap = fragment_capacity(cfg);
    while !rest.is_empty() {
        let take = rest.len().min(fcap);
        let (chunk, remainder) = rest.split_at(take);
        chunks.push(chunk);
        rest = remainder;
    }
    chunks
}

#[derive(Debug, Clone)]
enum ChainSlot {
    Main,
    Fragment { fill: FillState, crc: u16 },
}

fn read_fragment_header<D: BlockDevice>(io: &PageIo<D>, loc: Location) -> Result<crate::codec::FragmentHeader> {
    let mut buf = vec![0u8; FRAGMENT_HEADER_SIZE];
    io.read(loc.page, loc.byte, &mut buf)?;
    io.sync()?;
    decode_fragment_header(&buf)
}

/// Rewrites whichever page sits at `prev_loc`, preserving its on-disk
/// payload, so its pointer names `new_next_offset`. Used to patch a
/// fragment page's successor pointer when the page that was meant to come
/// right after it needed to relocate.
fn patch_chain_pointer<D: BlockDevice>(
    io: &PageIo<D>,
    cfg: &Config,
    prev_loc: Location,
    prev_slot: &ChainSlot,
    header_if_main: &mut Header,
    new_next_offset: u64,
) -> Result<Verified> {
    match prev_slot {
        ChainSlot::Main => {
            header_if_main.fragment_location = new_next_offset;
            relocate::rewrite_header_verified(io, cfg, prev_loc, header_if_main)
        }
        ChainSlot::Fragment { fill, crc } => {
            let payload_len = fragment_capacity(cfg);
            let mut payload = vec![0u8; payload_len];
            io.read(prev_loc.page, FRAGMENT_HEADER_SIZE as u32, &mut payload)?;
            io.erase(prev_loc.page)?;
            let mut buf = encode_fragment_header(*fill, new_next_offset, *crc);
            buf.extend_from_slice(&payload);
            let crc_offset = FRAGMENT_HEADER_SIZE - CRC_SIZE;
            relocate::write_page_verified(io, cfg, prev_loc, &buf, crc_offset, *crc)
        }
    }
}

/// Walks backward from `written[idx]` (whose own location just changed to
/// `new_offset`) patching whoever pointed at the page that moved, bounded by
/// the chain already built this call — never unbounded, since the chain
/// itself is finite.
fn cascade_relocation<D: BlockDevice>(
    io: &PageIo<D>,
    cfg: &Config,
    root: &mut RootManager,
    predecessor: Predecessor,
    predecessor_location: Location,
    predecessor_header: Header,
    written: &mut [(Location, ChainSlot)],
    header: &mut Header,
    mut idx: usize,
    mut new_offset: u64,
) -> Result<()> {
    loop {
        if idx == 0 {
            return relocate::patch_pointer(
                io,
                cfg,
                root,
                predecessor_location,
                predecessor_header,
                predecessor.into(),
                Location::from_offset(new_offset, cfg.page_size),
                0,
            );
        }

        let prev_idx = idx - 1;
        let prev_loc = written[prev_idx].0;
        let prev_slot = written[prev_idx].1.clone();
        match patch_chain_pointer(io, cfg, prev_loc, &prev_slot, header, new_offset)? {
            Verified::Good(_) => return Ok(()),
            Verified::Relocated(relocated) => {
                written[prev_idx].0 = relocated;
                new_offset = relocated.to_offset(cfg.page_size);
                idx = prev_idx;
            }
        }
    }
}

/// Writes a fresh chain for `data` starting at `location` (already erased,
/// or blank — callers truncating first call [`crate::remove::erase_chain`]).
/// `predecessor` is whoever's pointer currently names `location`, so a
/// relocation of the main page itself can be patched.
pub fn write_fresh<D: BlockDevice, C: CrcProvider>(
    io: &PageIo<D>,
    cfg: &Config,
    crc_provider: &C,
    root: &mut RootManager,
    location: Location,
    predecessor: Predecessor,
    predecessor_location: Location,
    predecessor_header: Header,
    mut header: Header,
    data: &[u8],
) -> Result<(Location, Header)> {
    header.file_size = data_file_size(cfg, data.len());
    let chunks = chunk_payload(cfg, data);

    let mut written: Vec<(Location, ChainSlot)> = Vec::with_capacity(chunks.len());
    let mut loc = location;

    for (idx, chunk) in chunks.iter().enumerate() {
        let is_last = idx + 1 == chunks.len();
        let next_loc = if is_last {
            None
        } else {
            Some(crate::alloc::find_next_open(io, cfg, Location::new(loc.page + 1, 0))?)
        };
        let next_offset = next_loc.map(|l| l.to_offset(cfg.page_size)).unwrap_or(0);
        let capacity = if idx == 0 { main_capacity(cfg) } else { fragment_capacity(cfg) };
        let fill = if chunk.len() == capacity { FillState::Full } else { FillState::Partial };

        let outcome = if idx == 0 {
            header.fragment_location = next_offset;
            header.file_info = header.file_info.with_fill_state(fill);
            let mut buf = header.encode(cfg.max_file_name);
            buf.extend_from_slice(chunk);
            let crc_offset = header_total_size(cfg.max_file_name) - CRC_SIZE;
            let outcome = relocate::write_page_verified(io, cfg, loc, &buf, crc_offset, header.crc)?;
            written.push((loc, ChainSlot::Main));
            outcome
        } else {
            let payload_crc = crc_provider.crc16(chunk);
            let mut buf = encode_fragment_header(fill, next_offset, payload_crc);
            buf.extend_from_slice(chunk);
            let crc_offset = FRAGMENT_HEADER_SIZE - CRC_SIZE;
            let outcome = relocate::write_page_verified(io, cfg, loc, &buf, crc_offset, payload_crc)?;
            written.push((loc, ChainSlot::Fragment { fill, crc: payload_crc }));
            outcome
        };

        if let Verified::Relocated(actual_loc) = outcome {
            written[idx].0 = actual_loc;
            cascade_relocation(
                io,
                cfg,
                root,
                predecessor,
                predecessor_location,
                predecessor_header.clone(),
                &mut written,
                &mut header,
                idx,
                actual_loc.to_offset(cfg.page_size),
            )?;
        }

        match next_loc {
            Some(n) => loc = n,
            None => break,
        }
    }

    bump_cursor_past(io, cfg, root, written.last().map(|(l, _)| *l).unwrap_or(location))?;

    Ok((written[0].0, header))
}

/// Walks the `fragment_location` chain from a file's main header to its
/// tail, returning the tail's location, whether the tail *is* the main
/// page (a file with no fragments yet), how many payload bytes already sit
/// on the tail, and the file's current logical payload length.
fn locate_tail<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, main_loc: Location, main_header: &Header) -> Result<(Location, bool, usize, usize)> {
    let mut loc = main_loc;
    let mut next = main_header.fragment_location;
    let mut tail_is_main = true;
    let mut num_fragments = 0usize;

    while next != 0 && next != UNINITIALISED {
        tail_is_main = false;
        loc = Location::from_offset(next, cfg.page_size);
        let frag = read_fragment_header(io, loc)?;
        next = frag.fragment_location;
        num_fragments += 1;
    }

    let overhead = header_total_size(cfg.max_file_name) + num_fragments * FRAGMENT_HEADER_SIZE;
    let n = (main_header.file_size as usize).saturating_sub(overhead);

    let mut consumed = 0usize;
    if num_fragments > 0 {
        consumed += main_capacity(cfg);
        consumed += fragment_capacity(cfg) * (num_fragments - 1);
    }
    let tail_used = n.saturating_sub(consumed);

    Ok((loc, tail_is_main, tail_used, n))
}

/// Appends `data` after a file's existing content: merges as much as fits
/// onto the current tail page (read back, combined, rewritten through the
/// same wear-retry path as everything else — no separate unverified
/// rewrite), then lays out further fragment pages for whatever's left.
pub fn append<D: BlockDevice, C: CrcProvider>(
    io: &PageIo<D>,
    cfg: &Config,
    crc_provider: &C,
    root: &mut RootManager,
    main_loc: Location,
    predecessor: Predecessor,
    predecessor_location: Location,
    predecessor_header: Header,
    mut header: Header,
    data: &[u8],
) -> Result<(Location, Header)> {
    if data.is_empty() {
        return Ok((main_loc, header));
    }

    let (tail_loc, tail_is_main, tail_used, n) = locate_tail(io, cfg, main_loc, &header)?;
    let tail_cap = if tail_is_main { main_capacity(cfg) } else { fragment_capacity(cfg) };
    let free_on_tail = tail_cap.saturating_sub(tail_used);

    let take = data.len().min(free_on_tail);
    let (tail_extra, overflow) = data.split_at(take);

    let header_span = if tail_is_main { header_total_size(cfg.max_file_name) } else { FRAGMENT_HEADER_SIZE };
    let mut merged = vec![0u8; tail_used];
    io.read(tail_loc.page, header_span as u32, &mut merged)?;
    io.sync()?;
    merged.extend_from_slice(tail_extra);

    header.file_size = data_file_size(cfg, n + data.len());

    let chunks = chunk_payload_continuation(cfg, overflow);
    let mut written: Vec<(Location, ChainSlot)> = Vec::with_capacity(1 + chunks.len());
    let mut loc = tail_loc;

    for (idx, chunk) in std::iter::once(merged.as_slice()).chain(chunks.iter().copied()).enumerate() {
        let is_last = idx == chunks.len();
        let next_loc = if is_last {
            None
        } else {
            Some(crate::alloc::find_next_open(io, cfg, Location::new(loc.page + 1, 0))?)
        };
        let next_offset = next_loc.map(|l| l.to_offset(cfg.page_size)).unwrap_or(0);
        let capacity = if idx == 0 && tail_is_main { main_capacity(cfg) } else { fragment_capacity(cfg) };
        let fill = if chunk.len() == capacity { FillState::Full } else { FillState::Partial };

        let outcome = if idx == 0 && tail_is_main {
            header.fragment_location = next_offset;
            header.file_info = header.file_info.with_fill_state(fill);
            let mut buf = header.encode(cfg.max_file_name);
            buf.extend_from_slice(chunk);
            let crc_offset = header_total_size(cfg.max_file_name) - CRC_SIZE;
            let outcome = relocate::write_page_verified(io, cfg, loc, &buf, crc_offset, header.crc)?;
            written.push((loc, ChainSlot::Main));
            outcome
        } else {
            let payload_crc = crc_provider.crc16(chunk);
            io.erase(loc.page)?;
            let mut buf = encode_fragment_header(fill, next_offset, payload_crc);
            buf.extend_from_slice(chunk);
            let crc_offset = FRAGMENT_HEADER_SIZE - CRC_SIZE;
            let outcome = relocate::write_page_verified(io, cfg, loc, &buf, crc_offset, payload_crc)?;
            written.push((loc, ChainSlot::Fragment { fill, crc: payload_crc }));
            outcome
        };

        if let Verified::Relocated(actual_loc) = outcome {
            let written_idx = written.len() - 1;
            written[written_idx].0 = actual_loc;
            if written_idx == 0 && tail_is_main {
                cascade_relocation(
                    io,
                    cfg,
                    root,
                    predecessor,
                    predecessor_location,
                    predecessor_header.clone(),
                    &mut written,
                    &mut header,
                    0,
                    actual_loc.to_offset(cfg.page_size),
                )?;
            } else if written_idx == 0 {
                // The tail was itself a fragment page; whoever pointed at its
                // old address is the page right before it in the persisted
                // chain, found the same way the relocator always does.
                let (pred, pred_loc, pred_header) = crate::walk::find_predecessor(io, cfg, root.root_location(), tail_loc)?;
                relocate::patch_pointer(io, cfg, root, pred_loc, pred_header, pred.into(), actual_loc, 0)?;
            } else {
                cascade_relocation(
                    io,
                    cfg,
                    root,
                    predecessor,
                    predecessor_location,
                    predecessor_header.clone(),
                    &mut written,
                    &mut header,
                    written_idx,
                    actual_loc.to_offset(cfg.page_size),
                )?;
            }
        }

        match next_loc {
            Some(n) => loc = n,
            None => break,
        }
    }

    let main_location = if tail_is_main { written[0].0 } else { main_loc };
    bump_cursor_past(io, cfg, root, written.last().map(|(l, _)| *l).unwrap_or(tail_loc))?;

    Ok((main_location, header))
}

fn chunk_payload_continuation(cfg: &Config, data: &[u8]) -> Vec<&[u8]> {
    let mut chunks = Vec::new();
    let fcap = fragment_capacity(cfg);
    let mut rest = data;
    while !rest.is_empty() {
        let take = rest.len().min(fcap);
        let (chunk, remainder) = rest.split_at(take);
        chunks.push(chunk);
        rest = remainder;
    }
    chunks
}
