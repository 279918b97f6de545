//! Fixed-capacity connection table with a free-list, per the ConnectionSlot
//! invariant: a slot's absence from `slots` (tracked via the free-list)
//! stands in for state FREE, and `len()` equals the count of non-FREE slots.

use crate::http::HttpConnection;
use mio::Token;

pub struct SlotTable {
    slots: Vec<Option<HttpConnection>>,
    free: Vec<usize>,
    base: usize,
}

impl SlotTable {
    pub fn with_capacity(capacity: usize, base: usize) -> Self {
        SlotTable {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
            base,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.capacity() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    fn index_of(&self, token: Token) -> Option<usize> {
        let idx = token.0.checked_sub(self.base)?;
        if idx < self.slots.len() { Some(idx) } else { None }
    }

    /// Pulls a slot from the head of the free-list. Returns `None` if the
    /// table is full (no queueing beyond the kernel accept backlog).
    pub fn try_insert(&mut self, conn: HttpConnection) -> Option<Token> {
        let idx = self.free.pop()?;
        self.slots[idx] = Some(conn);
        Some(Token(self.base + idx))
    }

    pub fn get(&self, token: Token) -> Option<&HttpConnection> {
        self.index_of(token).and_then(|i| self.slots[i].as_ref())
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut HttpConnection> {
        match self.index_of(token) {
            Some(i) => self.slots[i].as_mut(),
            None => None,
        }
    }

    pub fn remove(&mut self, token: Token) -> Option<HttpConnection> {
        let idx = self.index_of(token)?;
        let conn = self.slots[idx].take();
        if conn.is_some() {
            self.free.push(idx);
        }
        conn
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Token, &mut HttpConnection)> {
        let base = self.base;
        self.slots.iter_mut().enumerate().filter_map(move |(idx, slot)| {
            slot.as_mut().map(|conn| (Token(base + idx), conn))
        })
    }

    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        let base = self.base;
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(move |(idx, _)| Token(base + idx))
    }

    /// Retains slots for which `f` returns true; evicted slots return to the
    /// free-list, mirroring `HashMap::retain` for the old map-backed table.
    pub fn retain<F: FnMut(Token, &mut HttpConnection) -> bool>(&mut self, mut f: F) {
        let base = self.base;
        for idx in 0..self.slots.len() {
            let keep = match self.slots[idx].as_mut() {
                Some(conn) => f(Token(base + idx), conn),
                None => continue,
            };
            if !keep {
                self.slots[idx] = None;
                self.free.push(idx);
            }
        }
    }
}
