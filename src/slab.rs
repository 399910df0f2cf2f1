
// Slot bookkeeping, everything here lives behind the queue's spinlock
//
// Slots are threaded through one of three structures depending on state:
// - Free slots form a singly linked free list
// - Pending slots live in an indexed binary heap ordered by (target, seq)
// - Cancelled slots form a singly linked reclaim list, waiting for the
//   dispatcher to run their destructors
//
// Running slots are owned by the dispatcher and are in none of these.
//

use core::cmp::Ordering;

use crate::sys::utick;
use crate::util::*;
use crate::Delta;


#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum State {
    Free,
    Pending,
    Running,
    Reclaim,
}

unsafe fn noop_thunk(_: *mut u8) {}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) gen: u32,
    pub(crate) state: State,
    pub(crate) cancelled: bool,
    pub(crate) target: utick,
    pub(crate) period: Option<Delta>,
    pub(crate) seq: u64,
    // heap position when pending, otherwise unused
    pos: usize,
    // free/reclaim list link
    next: Option<u32>,
    pub(crate) cb: unsafe fn(*mut u8),
    pub(crate) drop: unsafe fn(*mut u8),
}

impl Slot {
    fn new(next: Option<u32>) -> Self {
        Self {
            gen: 0,
            state: State::Free,
            cancelled: false,
            target: 0,
            period: None,
            seq: 0,
            pos: 0,
            next: next,
            cb: noop_thunk,
            drop: noop_thunk,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Slab {
    pub(crate) slots: Vec<Slot>,
    heap: Vec<u32>,
    free: Option<u32>,
    reclaim: Option<u32>,
    seq: u64,
    pub(crate) running: usize,
    pub(crate) reclaiming: usize,
}

impl Slab {
    /// All memory is allocated here, nothing after construction allocates
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            slots: (0..capacity)
                .map(|i| Slot::new(if i+1 < capacity { Some(i+1) } else { None }))
                .collect(),
            heap: Vec::with_capacity(capacity as usize),
            free: if capacity > 0 { Some(0) } else { None },
            reclaim: None,
            seq: 0,
            running: 0,
            reclaiming: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn pending(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    pub(crate) fn peek_seq(&self) -> u64 {
        self.seq
    }

    // Free list
    pub(crate) fn alloc(&mut self) -> Option<u32> {
        let idx = self.free?;
        let slot = &mut self.slots[idx as usize];
        debug_assert_eq!(slot.state, State::Free);
        self.free = slot.next.take();
        Some(idx)
    }

    pub(crate) fn dealloc(&mut self, idx: u32) {
        let free = self.free;
        let slot = &mut self.slots[idx as usize];
        debug_assert!(slot.state != State::Free && slot.state != State::Pending);

        // a new generation invalidates any outstanding ids
        slot.gen = slot.gen.wrapping_add(1);
        slot.state = State::Free;
        slot.cancelled = false;
        slot.period = None;
        slot.cb = noop_thunk;
        slot.drop = noop_thunk;
        slot.next = free;
        self.free = Some(idx);
    }

    /// Look up a slot by id, None if the id is stale
    pub(crate) fn get(&self, idx: u32, gen: u32) -> Option<&Slot> {
        self.slots.get(idx as usize)
            .filter(|slot| slot.gen == gen && slot.state != State::Free)
    }

    // Reclaim list
    pub(crate) fn push_reclaim(&mut self, idx: u32) {
        let reclaim = self.reclaim;
        let slot = &mut self.slots[idx as usize];
        slot.state = State::Reclaim;
        slot.cancelled = true;
        slot.next = reclaim;
        self.reclaim = Some(idx);
        self.reclaiming += 1;
    }

    pub(crate) fn pop_reclaim(&mut self) -> Option<(u32, unsafe fn(*mut u8))> {
        let idx = self.reclaim?;
        let slot = &mut self.slots[idx as usize];
        debug_assert_eq!(slot.state, State::Reclaim);
        self.reclaim = slot.next.take();
        self.reclaiming -= 1;
        // reclaimed slots count as running until their destructor is done
        slot.state = State::Running;
        self.running += 1;
        Some((idx, slot.drop))
    }

    // Heap
    fn before(&self, a: u32, b: u32) -> bool {
        let a = &self.slots[a as usize];
        let b = &self.slots[b as usize];
        match scmp(a.target, b.target) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => a.seq < b.seq,
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let (ia, ib) = (self.heap[a], self.heap[b]);
        self.slots[ia as usize].pos = a;
        self.slots[ib as usize].pos = b;
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos-1) / 2;
            if !self.before(self.heap[pos], self.heap[parent]) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let left = 2*pos + 1;
            let right = left + 1;
            let mut first = pos;
            if left < self.heap.len() && self.before(self.heap[left], self.heap[first]) {
                first = left;
            }
            if right < self.heap.len() && self.before(self.heap[right], self.heap[first]) {
                first = right;
            }
            if first == pos {
                break;
            }
            self.swap(pos, first);
            pos = first;
        }
    }

    /// Insert a slot into the heap, target/seq must already be set
    pub(crate) fn enqueue(&mut self, idx: u32) {
        // the heap was sized to capacity, this never reallocates
        debug_assert!(self.heap.len() < self.heap.capacity());
        let pos = self.heap.len();
        self.heap.push(idx);
        let slot = &mut self.slots[idx as usize];
        slot.state = State::Pending;
        slot.pos = pos;
        self.sift_up(pos);
    }

    /// Remove a pending slot from the heap
    pub(crate) fn unqueue(&mut self, idx: u32) {
        let pos = self.slots[idx as usize].pos;
        debug_assert_eq!(self.heap[pos], idx);
        let last = self.heap.len() - 1;
        self.swap(pos, last);
        self.heap.pop();
        if pos < self.heap.len() {
            self.sift_down(pos);
            self.sift_up(pos);
        }
    }

    /// The soonest pending slot
    pub(crate) fn peek(&self) -> Option<&Slot> {
        self.heap.first().map(|&idx| &self.slots[idx as usize])
    }

    /// Pop the soonest slot if it is due at `now` and was enqueued before
    /// `seq`, marking it as running
    pub(crate) fn dequeue(&mut self, now: utick, seq: u64) -> Option<u32> {
        let &idx = self.heap.first()?;
        let slot = &self.slots[idx as usize];
        if scmp(slot.target, now).is_gt() || slot.seq >= seq {
            return None;
        }

        self.unqueue(idx);
        self.slots[idx as usize].state = State::Running;
        self.running += 1;
        Some(idx)
    }

    /// Drain every pending slot onto the reclaim list, returns how many
    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.heap.len();
        while let Some(idx) = self.heap.pop() {
            self.push_reclaim(idx);
        }

        // running periodic events must not come back
        for slot in self.slots.iter_mut() {
            if slot.state == State::Running {
                slot.cancelled = true;
            }
        }

        count
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn push(slab: &mut Slab, target: utick) -> u32 {
        let idx = slab.alloc().unwrap();
        let seq = slab.next_seq();
        let slot = &mut slab.slots[idx as usize];
        slot.target = target;
        slot.seq = seq;
        slab.enqueue(idx);
        idx
    }

    fn drain(slab: &mut Slab) -> Vec<utick> {
        let mut targets = vec![];
        while let Some(idx) = slab.dequeue(utick::MAX/2, u64::MAX) {
            targets.push(slab.slots[idx as usize].target);
            slab.running -= 1;
            slab.dealloc(idx);
        }
        targets
    }

    #[test]
    fn test_slab_order() {
        let mut slab = Slab::new(16);
        for &target in &[5, 3, 9, 1, 3, 7, 0, 2] {
            push(&mut slab, target);
        }
        assert_eq!(drain(&mut slab), vec![0, 1, 2, 3, 3, 5, 7, 9]);
    }

    #[test]
    fn test_slab_fifo() {
        let mut slab = Slab::new(16);
        let ids = (0..10).map(|_| push(&mut slab, 42)).collect::<Vec<_>>();
        let mut order = vec![];
        while let Some(idx) = slab.dequeue(42, u64::MAX) {
            order.push(idx);
            slab.running -= 1;
            slab.dealloc(idx);
        }
        assert_eq!(order, ids);
    }

    #[test]
    fn test_slab_unqueue() {
        let mut slab = Slab::new(16);
        let ids = [9, 4, 6, 1, 8, 2, 5]
            .iter()
            .map(|&target| (target, push(&mut slab, target)))
            .collect::<Vec<_>>();

        // remove from the middle, the front, and the back
        for &(target, idx) in &ids {
            if target == 6 || target == 1 || target == 9 {
                slab.unqueue(idx);
                slab.push_reclaim(idx);
            }
        }
        assert_eq!(drain(&mut slab), vec![2, 4, 5, 8]);
        assert_eq!(slab.reclaiming, 3);
    }

    #[test]
    fn test_slab_exhaustion() {
        let mut slab = Slab::new(2);
        let a = slab.alloc().unwrap();
        let _b = slab.alloc().unwrap();
        assert_eq!(slab.alloc(), None);

        slab.slots[a as usize].state = State::Running;
        let gen = slab.slots[a as usize].gen;
        slab.dealloc(a);
        assert!(slab.get(a, gen).is_none());
        assert_eq!(slab.alloc(), Some(a));
    }

    #[test]
    fn test_slab_dequeue_respects_seq() {
        let mut slab = Slab::new(4);
        push(&mut slab, 10);
        let limit = slab.peek_seq();
        push(&mut slab, 5);

        // the later post is sooner, but isn't part of this round
        assert_eq!(slab.dequeue(10, limit), None);
        assert!(slab.dequeue(10, u64::MAX).is_some());
    }
}
