//! Deletes a file or directory (recursively, for directories) and re-links
//! whichever pointer named it: erase the fragment chain, recurse into
//! children, then patch the predecessor — parent's `child_location` or a
//! sibling's `sibling_location`, whichever tagged the removed node.

use crate::codec::{decode_fragment_header, FileType, Header, Location, FRAGMENT_HEADER_SIZE, UNINITIALISED};
use crate::config::Config;
use crate::device::{BlockDevice, PageIo};
use crate::error::{Result, StorfsError};
use crate::header;
use crate::relocate::{self, Verified};
use crate::root::RootManager;
use crate::walk::Predecessor;

/// Erases every page in a header's own chain: the header's page itself plus
/// however many fragment pages follow it. Used both to delete a node
/// outright and to clear the way for a truncating overwrite.
pub fn erase_chain<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, loc: Location, header_value: &Header) -> Result<()> {
    let mut next = header_value.fragment_location;
    io.erase(loc.page)?;

    while next != 0 && next != UNINITIALISED {
        let frag_loc = Location::from_offset(next, cfg.page_size);
        let mut buf = vec![0u8; FRAGMENT_HEADER_SIZE];
        io.read(frag_loc.page, frag_loc.byte, &mut buf)?;
        io.sync()?;
        let frag = decode_fragment_header(&buf)?;
        io.erase(frag_loc.page)?;
        next = frag.fragment_location;
    }
    Ok(())
}

/// Erases `loc`'s chain, and for a directory, every descendant's chain too.
/// Order doesn't need to be strict post- or pre-order: each chain is erased
/// independently of its neighbors' contents, only the pointer graph
/// (already fully read before any erase happens for that node) matters.
/// Bounded by the device's own page count, since a corrupt on-media cycle
/// would otherwise loop forever.
fn remove_subtree<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, loc: Location, header_value: &Header) -> Result<()> {
    let budget = io.page_count().max(1);
    let mut visited = 0u64;
    let mut stack = vec![(loc, header_value.clone())];

    while let Some((node_loc, node_header)) = stack.pop() {
        visited += 1;
        if visited > budget {
            return Err(StorfsError::Generic);
        }

        if node_header.file_info.file_type() == FileType::Directory {
            let mut child = node_header.child_location;
            while child != 0 && child != UNINITIALISED {
                let child_loc = Location::from_offset(child, cfg.page_size);
                let child_header = header::store(io, child_loc, cfg.max_file_name)?;
                let next_sibling = child_header.sibling_location;
                stack.push((child_loc, child_header));
                child = next_sibling;
            }
        }

        erase_chain(io, cfg, node_loc, &node_header)?;
    }
    Ok(())
}

/// Removes the node at `location` (recursing into it if it's a directory),
/// then re-links `predecessor` past it and pulls the cursor back if the
/// freed space sits at or before it.
pub fn remove<D: BlockDevice>(
    io: &PageIo<D>,
    cfg: &Config,
    root: &mut RootManager,
    location: Location,
    header_value: Header,
    predecessor: Predecessor,
    predecessor_location: Location,
    predecessor_header: Header,
) -> Result<()> {
    remove_subtree(io, cfg, location, &header_value)?;

    let mut pred_header = predecessor_header;
    match predecessor {
        Predecessor::Parent(_) => pred_header.child_location = header_value.sibling_location,
        Predecessor::Sibling(_) => pred_header.sibling_location = header_value.sibling_location,
        Predecessor::FragmentOwner(_) => return Err(StorfsError::Generic),
    }

    if root.is_root_location(predecessor_location) {
        root.set_child(io, cfg, pred_header.child_location)?;
    } else {
        match relocate::rewrite_header_verified(io, cfg, predecessor_location, &pred_header)? {
            Verified::Good(_) => {}
            Verified::Relocated(relocated_loc) => {
                let (grandparent, grandparent_loc, grandparent_header) =
                    crate::walk::find_predecessor(io, cfg, root.root_location(), predecessor_location)?;
                relocate::patch_pointer(
                    io,
                    cfg,
                    root,
                    grandparent_loc,
                    grandparent_header,
                    grandparent.into(),
                    relocated_loc,
                    0,
                )?;
            }
        }
    }

    root.reclaim(io, cfg, location)
}
