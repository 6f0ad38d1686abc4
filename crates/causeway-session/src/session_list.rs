//! Slab-backed circular doubly-linked list of idle server sessions.
//!
//! Nodes live in a `Vec` of slots and link to each other by index. The head
//! is the most recently released session; `head.prev` is the tail. Freed
//! slots are recycled through a free list, so a pool that churns through
//! sessions does not grow its backing storage.

use std::time::Instant;

use crate::server_session::ServerSession;

#[derive(Debug)]
struct Slot {
    session: Option<ServerSession>,
    prev: usize,
    next: usize,
}

/// LIFO list with O(1) push-front, pop-front and removal by slot index.
#[derive(Debug, Default)]
pub(crate) struct SessionList {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    len: usize,
}

impl SessionList {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Makes `session` the new head.
    pub(crate) fn push_front(&mut self, session: ServerSession) {
        let idx = self.allocate(session);
        match self.head {
            None => {
                self.slots[idx].prev = idx;
                self.slots[idx].next = idx;
            }
            Some(head) => {
                let tail = self.slots[head].prev;
                self.slots[idx].prev = tail;
                self.slots[idx].next = head;
                self.slots[tail].next = idx;
                self.slots[head].prev = idx;
            }
        }
        self.head = Some(idx);
        self.len += 1;
    }

    /// Removes and returns the head.
    pub(crate) fn pop_front(&mut self) -> Option<ServerSession> {
        let head = self.head?;
        self.remove(head)
    }

    /// The head session, if any.
    pub(crate) fn front(&self) -> Option<&ServerSession> {
        self.slots[self.head?].session.as_ref()
    }

    /// Unlinks the node in slot `idx`.
    pub(crate) fn remove(&mut self, idx: usize) -> Option<ServerSession> {
        let slot = self.slots.get_mut(idx)?;
        let session = slot.session.take()?;
        let (prev, next) = (slot.prev, slot.next);

        if next == idx {
            self.head = None;
        } else {
            self.slots[prev].next = next;
            self.slots[next].prev = prev;
            if self.head == Some(idx) {
                self.head = Some(next);
            }
        }

        self.free.push(idx);
        self.len -= 1;
        Some(session)
    }

    /// Removes every session matching `pred`, returning them head-first.
    pub(crate) fn remove_where(
        &mut self,
        mut pred: impl FnMut(&ServerSession) -> bool,
    ) -> Vec<ServerSession> {
        let doomed: Vec<usize> = self
            .indices()
            .into_iter()
            .filter(|&idx| self.slots[idx].session.as_ref().is_some_and(&mut pred))
            .collect();

        doomed
            .into_iter()
            .filter_map(|idx| self.remove(idx))
            .collect()
    }

    /// Removes every session that has expired at `now`.
    pub(crate) fn reap(&mut self, now: Instant, timeout_minutes: Option<u32>) -> Vec<ServerSession> {
        if timeout_minutes.is_none() {
            return Vec::new();
        }
        self.remove_where(|session| session.is_expired(now, timeout_minutes))
    }

    /// Iterates head-first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &ServerSession> + '_ {
        self.indices()
            .into_iter()
            .filter_map(move |idx| self.slots[idx].session.as_ref())
    }

    /// Removes everything, head-first.
    pub(crate) fn drain(&mut self) -> Vec<ServerSession> {
        let mut sessions = Vec::with_capacity(self.len);
        while let Some(session) = self.pop_front() {
            sessions.push(session);
        }
        sessions
    }

    fn indices(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.len);
        let Some(head) = self.head else {
            return out;
        };
        let mut idx = head;
        // Bounded by `len`: a corrupted link can never loop forever.
        for _ in 0..self.len {
            out.push(idx);
            idx = self.slots[idx].next;
            if idx == head {
                break;
            }
        }
        out
    }

    fn allocate(&mut self, session: ServerSession) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx].session = Some(session);
            idx
        } else {
            self.slots.push(Slot {
                session: Some(session),
                prev: 0,
                next: 0,
            });
            self.slots.len() - 1
        }
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_types::SessionId;

    fn session(n: u8) -> ServerSession {
        ServerSession::with_id(SessionId::from_bytes([n; 16]))
    }

    fn ids(list: &SessionList) -> Vec<u8> {
        list.iter().map(|s| s.id().as_bytes()[0]).collect()
    }

    #[test]
    fn push_and_pop_are_lifo() {
        let mut list = SessionList::default();
        list.push_front(session(1));
        list.push_front(session(2));
        list.push_front(session(3));

        assert_eq!(ids(&list), vec![3, 2, 1]);
        assert_eq!(list.pop_front().map(|s| s.id().as_bytes()[0]), Some(3));
        assert_eq!(list.pop_front().map(|s| s.id().as_bytes()[0]), Some(2));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn single_element_links_to_itself() {
        let mut list = SessionList::default();
        list.push_front(session(1));
        assert_eq!(ids(&list), vec![1]);
        assert!(list.pop_front().is_some());
        assert!(list.is_empty());
        assert!(list.pop_front().is_none());
        assert!(list.front().is_none());
    }

    #[test]
    fn remove_from_the_middle_keeps_order() {
        let mut list = SessionList::default();
        for n in 1..=4 {
            list.push_front(session(n));
        }
        let removed = list.remove_where(|s| s.id().as_bytes()[0] == 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(ids(&list), vec![4, 3, 1]);

        // Removing the head moves it to the next node.
        let removed = list.remove_where(|s| s.id().as_bytes()[0] == 4);
        assert_eq!(removed.len(), 1);
        assert_eq!(list.front().map(|s| s.id().as_bytes()[0]), Some(3));
        assert_eq!(ids(&list), vec![3, 1]);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut list = SessionList::default();
        for n in 1..=3 {
            list.push_front(session(n));
        }
        list.drain();
        for n in 4..=6 {
            list.push_front(session(n));
        }
        assert_eq!(list.capacity(), 3);
        assert_eq!(ids(&list), vec![6, 5, 4]);
    }

    #[test]
    fn removing_a_vacant_slot_is_a_noop() {
        let mut list = SessionList::default();
        list.push_front(session(1));
        assert!(list.remove(5).is_none());
        let _ = list.pop_front();
        assert!(list.remove(0).is_none());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn remove_everything() {
        let mut list = SessionList::default();
        for n in 1..=5 {
            list.push_front(session(n));
        }
        let removed = list.remove_where(|_| true);
        assert_eq!(removed.len(), 5);
        assert!(list.is_empty());
        assert!(list.iter().next().is_none());
    }
}
