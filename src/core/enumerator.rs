//! Depth-first content enumeration
//!
//! [`ContentEnumerator`] visits the root, then walks every child listing page
//! by page, descending into each child before moving on to its next sibling
//! (pre-order, page order within a level). Open listings are kept on an
//! explicit stack instead of the call stack, so tree depth is bounded by
//! memory rather than thread stack size. The provider sees exactly the same
//! call sequence as it would from a recursive walk.
//!
//! The visited count is `1` for the root plus the length of every page
//! fetched. Ids are counted when their page arrives, before their subtree is
//! walked, so an aborted walk still reports everything it discovered.

use crate::core::error::{EnumError, Result};
use crate::core::fetcher::{PageCursor, PagedChildFetcher};
use crate::device::traits::{ChildCursor, ContentSession, ContentType, ObjectId};
use log::{debug, trace, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of walking one tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnumResult {
    /// Root plus every id returned by a page fetch
    pub visited_count: u64,
    /// The walk reached the end of every listing
    pub completed: bool,
    /// Deepest level visited (root is 0)
    pub max_depth: usize,
    /// Why the walk stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnumResult {
    /// Result for an empty or invalid root
    pub fn empty() -> Self {
        Self {
            visited_count: 0,
            completed: true,
            max_depth: 0,
            error: None,
        }
    }
}

/// Called once per object, parent before children
///
/// Returning an error stops the whole walk.
pub trait ObjectVisitor<S: ContentSession> {
    fn visit(&mut self, session: &S, object: &ObjectId, depth: usize) -> Result<()>;
}

impl<S, F> ObjectVisitor<S> for F
where
    S: ContentSession,
    F: FnMut(&S, &ObjectId, usize) -> Result<()>,
{
    fn visit(&mut self, session: &S, object: &ObjectId, depth: usize) -> Result<()> {
        self(session, object, depth)
    }
}

/// An open listing plus the ids of its current page not yet walked
struct Frame<C: ChildCursor> {
    cursor: PageCursor<C>,
    pending: VecDeque<ObjectId>,
    depth: usize,
}

/// Walks a device's object tree
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentEnumerator {
    fetcher: PagedChildFetcher,
}

impl ContentEnumerator {
    pub fn new(page_size: u32) -> Self {
        Self {
            fetcher: PagedChildFetcher::new(page_size),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.fetcher.page_size()
    }

    /// Walk the tree under `root`, calling `visitor` for every object
    ///
    /// Never fails as such: an error anywhere stops the walk and is reported
    /// through `completed = false` and `error`. An invalid root is an empty,
    /// complete walk.
    pub fn enumerate<S, V>(&self, session: &S, root: &ObjectId, visitor: &mut V) -> EnumResult
    where
        S: ContentSession,
        V: ObjectVisitor<S>,
    {
        if !root.is_valid() {
            debug!("Enumeration requested with an empty root id, nothing to do");
            return EnumResult::empty();
        }

        let mut result = EnumResult {
            visited_count: 1,
            ..EnumResult::empty()
        };

        match self.walk(session, root, visitor, &mut result) {
            Ok(()) => {
                debug!(
                    "Walked '{}': {} object(s), depth {}",
                    root, result.visited_count, result.max_depth
                );
            }
            Err(e) => {
                warn!(
                    "Enumeration under '{}' stopped after {} object(s): {}",
                    root, result.visited_count, e
                );
                result.completed = false;
                result.error = Some(e.to_string());
            }
        }

        result
    }

    fn walk<S, V>(
        &self,
        session: &S,
        root: &ObjectId,
        visitor: &mut V,
        result: &mut EnumResult,
    ) -> Result<()>
    where
        S: ContentSession,
        V: ObjectVisitor<S>,
    {
        visitor.visit(session, root, 0)?;

        let mut stack: Vec<Frame<S::Cursor>> = vec![Frame {
            cursor: self.fetcher.open(session, root)?,
            pending: VecDeque::new(),
            depth: 0,
        }];

        // Dropping the stack on `?` releases every listing still open
        while let Some(frame) = stack.last_mut() {
            if let Some(child) = frame.pending.pop_front() {
                if !child.is_valid() {
                    trace!("Skipping empty id under '{}'", frame.cursor.parent());
                    continue;
                }

                let depth = frame.depth + 1;
                result.max_depth = result.max_depth.max(depth);
                visitor.visit(session, &child, depth)?;

                let cursor = self.fetcher.open(session, &child)?;
                stack.push(Frame {
                    cursor,
                    pending: VecDeque::new(),
                    depth,
                });
                continue;
            }

            if frame.cursor.is_exhausted() {
                if let Some(done) = stack.pop() {
                    done.cursor.close();
                }
                continue;
            }

            let page = frame.cursor.next()?;
            result.visited_count += page.ids.len() as u64;
            frame.pending.extend(page.ids);
        }

        result.completed = true;
        Ok(())
    }
}

/// Visitor that logs each object's properties at debug level
///
/// Failing to read properties is logged and does not stop the walk. A set
/// shutdown flag stops it with [`EnumError::Interrupted`].
pub struct PropertyDumper {
    shutdown: Option<Arc<AtomicBool>>,
    read_properties: bool,
    property_failures: usize,
}

impl PropertyDumper {
    pub fn new() -> Self {
        Self {
            shutdown: None,
            read_properties: false,
            property_failures: 0,
        }
    }

    /// Read properties of every object even when debug logging is off
    pub fn always_read_properties(mut self) -> Self {
        self.read_properties = true;
        self
    }

    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Objects whose properties could not be read
    pub fn property_failures(&self) -> usize {
        self.property_failures
    }
}

impl Default for PropertyDumper {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ContentSession> ObjectVisitor<S> for PropertyDumper {
    fn visit(&mut self, session: &S, object: &ObjectId, depth: usize) -> Result<()> {
        if let Some(flag) = &self.shutdown {
            if flag.load(Ordering::SeqCst) {
                return Err(EnumError::Interrupted);
            }
        }

        debug!("enum content: {} (depth {})", object, depth);

        // Reading properties costs a round trip per object
        if !self.read_properties && !log::log_enabled!(log::Level::Debug) {
            return Ok(());
        }

        match session.properties(object) {
            Ok(props) => {
                debug!("  {} propert(ies)", props.len());
                for key in props.keys() {
                    trace!("  {}", key);
                }
                if let Some(name) = props.original_file_name() {
                    debug!("  {}", name);
                }
                match props.content_type() {
                    Some(ContentType::Other(guid)) => {
                        debug!("  Content type: {:032x}", guid);
                    }
                    Some(ct) => debug!("  Content type: {}", ct.display_name()),
                    None => {}
                }
            }
            Err(e) => {
                self.property_failures += 1;
                debug!("  ! Failed to read properties of '{}': {}", object, e);
            }
        }

        Ok(())
    }
}
