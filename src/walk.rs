//! Resolves a path into an existing header, or — when no match remains —
//! identifies the predecessor whose pointer must be patched to link in a
//! new header.

use crate::codec::{Header, Location, UNINITIALISED};
use crate::config::Config;
use crate::device::{BlockDevice, PageIo};
use crate::error::{Result, StorfsError};

/// The pointer that names a node: a parent's `child_location`, a sibling's
/// `sibling_location`, or (used by the relocator, not the walker) a
/// fragment's owner via `fragment_location`. A tagged enum rather than
/// bidirectional links, per the design notes on cyclic graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predecessor {
    Parent(Location),
    Sibling(Location),
    FragmentOwner(Location),
}

/// Outcome of resolving a path against the tree.
pub enum Resolved {
    Found {
        location: Location,
        header: Header,
        /// The node whose pointer named `location` — `None` only for the
        /// root itself, which has no predecessor. Carried so `rm` and the
        /// relocator can amend the right pointer without a second forward
        /// search.
        predecessor: Option<Predecessor>,
        predecessor_location: Option<Location>,
        predecessor_header: Option<Header>,
    },
    /// No header matched the next segment, and there are no more siblings
    /// to check — the walker has reached the point where a creator would
    /// allocate a new header and patch `predecessor`.
    Missing {
        predecessor: Predecessor,
        predecessor_location: Location,
        predecessor_header: Header,
        segment_name: String,
        is_last_segment: bool,
    },
}

/// Resolve `path` (leading segment = partition name, matched against
/// `root_header`) against the tree rooted at `root_loc`/`root_header`.
///
/// A segment with more segments after it must not contain `.` — a "file
/// cannot have a child" rule, since such a segment would be interpreted as
/// a file by its extension.
pub fn resolve<D: BlockDevice>(
    io: &PageIo<D>,
    cfg: &Config,
    root_loc: Location,
    root_header: &Header,
    path: &str,
) -> Result<Resolved> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() || segments[0] != root_header.name_str() {
        return Err(StorfsError::Generic);
    }
    if segments.len() == 1 {
        return Ok(Resolved::Found {
            location: root_loc,
            header: root_header.clone(),
            predecessor: None,
            predecessor_location: None,
            predecessor_header: None,
        });
    }

    let mut current_location = root_loc;
    let mut current_header = root_header.clone();
    let last_index = segments.len() - 2;

    for (i, seg) in segments[1..].iter().enumerate() {
        let is_last = i == last_index;
        if !is_last && seg.contains('.') {
            return Err(StorfsError::Generic);
        }

        if current_header.child_location == UNINITIALISED {
            return Err(StorfsError::Generic);
        }
        if current_header.child_location == 0 {
            return Ok(Resolved::Missing {
                predecessor: Predecessor::Parent(current_location),
                predecessor_location: current_location,
                predecessor_header: current_header,
                segment_name: (*seg).to_string(),
                is_last_segment: is_last,
            });
        }

        let mut candidate_loc = Location::from_offset(current_header.child_location, io.page_size());
        let mut candidate_predecessor = Predecessor::Parent(current_location);
        let mut candidate_predecessor_loc = current_location;
        let mut candidate_predecessor_header = current_header.clone();
        loop {
            let candidate_header = crate::header::store(io, candidate_loc, cfg.max_file_name)?;
            if candidate_header.name_str() == *seg {
                if is_last {
                    return Ok(Resolved::Found {
                        location: candidate_loc,
                        header: candidate_header,
                        predecessor: Some(candidate_predecessor),
                        predecessor_location: Some(candidate_predecessor_loc),
                        predecessor_header: Some(candidate_predecessor_header),
                    });
                }
                current_location = candidate_loc;
                current_header = candidate_header;
                break;
            }

            if candidate_header.sibling_location == UNINITIALISED {
                return Err(StorfsError::Generic);
            }
            if candidate_header.sibling_location == 0 {
                return Ok(Resolved::Missing {
                    predecessor: Predecessor::Sibling(candidate_loc),
                    predecessor_location: candidate_loc,
                    predecessor_header: candidate_header,
                    segment_name: (*seg).to_string(),
                    is_last_segment: is_last,
                });
            }
            candidate_predecessor = Predecessor::Sibling(candidate_loc);
            candidate_predecessor_loc = candidate_loc;
            candidate_predecessor_header = candidate_header.clone();
            candidate_loc = Location::from_offset(candidate_header.sibling_location, io.page_size());
        }
    }

    Err(StorfsError::Generic)
}

/// Searches forward from the root for the header whose `child_location` or
/// `sibling_location` names `target`'s *original* address. Used by the
/// relocator when it must back-patch a predecessor it did not already have
/// in hand (a recursive relocation one or more levels removed from the
/// write that triggered it).
pub fn find_predecessor<D: BlockDevice>(
    io: &PageIo<D>,
    cfg: &Config,
    root_loc: Location,
    target: Location,
) -> Result<(Predecessor, Location, Header)> {
    let target_offset = target.to_offset(io.page_size());
    let mut stack = vec![root_loc];
    let mut visited = 0u64;
    let budget = io.page_count().max(1);

    while let Some(loc) = stack.pop() {
        visited += 1;
        if visited > budget {
            return Err(StorfsError::Generic);
        }

        let header = crate::header::store(io, loc, cfg.max_file_name)?;

        if header.child_location != 0 && header.child_location != UNINITIALISED {
            if header.child_location == target_offset {
                return Ok((Predecessor::Parent(loc), loc, header));
            }
            stack.push(Location::from_offset(header.child_location, io.page_size()));
        }
        if header.sibling_location != 0 && header.sibling_location != UNINITIALISED {
            if header.sibling_location == target_offset {
                return Ok((Predecessor::Sibling(loc), loc, header));
            }
            stack.push(Location::from_offset(header.sibling_location, io.page_size()));
        }
    }

    Err(StorfsError::Generic)
}
