//! Cursors and scans built on [`KvTransaction::seek`].

use crate::error::{KvError, KvResult};
use crate::storage::{Direction, Entry, KvTransaction, NamedMap};
use std::ops::Bound;

/// A bidirectional cursor over one map.
///
/// Cursors are single-use: after [`Cursor::close`] every call fails with
/// [`KvError::CursorClosed`].
pub trait Cursor {
    /// Moves to the next entry. Returns false past the last one.
    fn move_next(&mut self) -> KvResult<bool>;

    /// Moves to the previous entry. Returns false before the first one.
    fn move_prev(&mut self) -> KvResult<bool>;

    /// Key of the current entry.
    fn key(&self) -> KvResult<&[u8]>;

    /// Value of the current entry.
    fn value(&self) -> KvResult<&[u8]>;

    /// Invalidates the cursor.
    fn close(&mut self);
}

#[derive(Debug, Clone)]
enum Position {
    /// Freshly navigated; `None` means "no key given".
    Start(Option<Vec<u8>>),
    At(Vec<u8>),
    PastEnd,
    BeforeStart,
}

/// The cursor returned by `navigate_to`.
///
/// After navigating to `Some(key)`, `move_next` lands on the first key
/// `>= key` and `move_prev` on the last key `< key`. After navigating to
/// `None` they land on the first and last key respectively.
pub struct SeekCursor<'t> {
    txn: &'t (dyn KvTransaction + 't),
    map: NamedMap,
    position: Position,
    current: Option<Entry>,
    closed: bool,
}

impl<'t> SeekCursor<'t> {
    fn step(&mut self, direction: Direction) -> KvResult<bool> {
        if self.closed {
            return Err(KvError::CursorClosed);
        }
        let bound = match (&self.position, direction) {
            (Position::Start(None), _)
            | (Position::BeforeStart, Direction::Forward)
            | (Position::PastEnd, Direction::Backward) => Bound::Unbounded,
            (Position::Start(Some(key)), Direction::Forward) => Bound::Included(key.as_slice()),
            (Position::Start(Some(key)), Direction::Backward) | (Position::At(key), _) => {
                Bound::Excluded(key.as_slice())
            }
            (Position::PastEnd, Direction::Forward) | (Position::BeforeStart, Direction::Backward) => {
                return Ok(false);
            }
        };
        let found = self.txn.seek(&self.map, bound, direction)?;
        match found {
            Some(entry) => {
                self.position = Position::At(entry.0.clone());
                self.current = Some(entry);
                Ok(true)
            }
            None => {
                self.position = match direction {
                    Direction::Forward => Position::PastEnd,
                    Direction::Backward => Position::BeforeStart,
                };
                self.current = None;
                Ok(false)
            }
        }
    }

    fn current(&self) -> KvResult<&Entry> {
        if self.closed {
            return Err(KvError::CursorClosed);
        }
        self.current.as_ref().ok_or(KvError::CursorNotPositioned)
    }
}

impl Cursor for SeekCursor<'_> {
    fn move_next(&mut self) -> KvResult<bool> {
        self.step(Direction::Forward)
    }

    fn move_prev(&mut self) -> KvResult<bool> {
        self.step(Direction::Backward)
    }

    fn key(&self) -> KvResult<&[u8]> {
        self.current().map(|(key, _)| key.as_slice())
    }

    fn value(&self) -> KvResult<&[u8]> {
        self.current().map(|(_, value)| value.as_slice())
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}

/// Iterator over the entries of one map, in either direction.
pub struct Scan<'t> {
    txn: &'t (dyn KvTransaction + 't),
    map: NamedMap,
    next: Option<Bound<Vec<u8>>>,
    direction: Direction,
}

impl Iterator for Scan<'_> {
    type Item = KvResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        let bound = self.next.take()?;
        let found = self
            .txn
            .seek(&self.map, bound.as_ref().map(Vec::as_slice), self.direction);
        match found {
            Ok(Some(entry)) => {
                self.next = Some(Bound::Excluded(entry.0.clone()));
                Some(Ok(entry))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<'a> dyn KvTransaction + 'a {
    /// Opens a cursor positioned relative to `key`.
    pub fn navigate_to(&self, map: &NamedMap, key: Option<&[u8]>) -> KvResult<SeekCursor<'_>> {
        if self.is_finished() {
            return Err(KvError::TransactionFinished);
        }
        Ok(SeekCursor {
            txn: self,
            map: map.clone(),
            position: Position::Start(key.map(<[u8]>::to_vec)),
            current: None,
            closed: false,
        })
    }

    /// Iterates forward from `from` (inclusive), or from the first key.
    pub fn scan(&self, map: &NamedMap, from: Option<&[u8]>) -> Scan<'_> {
        Scan {
            txn: self,
            map: map.clone(),
            next: Some(from.map_or(Bound::Unbounded, |k| Bound::Included(k.to_vec()))),
            direction: Direction::Forward,
        }
    }

    /// Iterates backward from the last key.
    pub fn scan_reversed(&self, map: &NamedMap) -> Scan<'_> {
        Scan {
            txn: self,
            map: map.clone(),
            next: Some(Bound::Unbounded),
            direction: Direction::Backward,
        }
    }

    /// Iterates forward over all keys starting with `prefix`.
    pub fn scan_prefix(
        &self,
        map: &NamedMap,
        prefix: &[u8],
    ) -> impl Iterator<Item = KvResult<Entry>> + '_ {
        let prefix = prefix.to_vec();
        self.scan(map, Some(prefix.as_slice())).take_while(move |entry| match entry {
            Ok((key, _)) => key.starts_with(&prefix),
            Err(_) => true,
        })
    }
}
