//! Unbounded multi-producer/multi-consumer FIFO connecting the pipeline stages.
//!
//! This is the Michael–Scott queue: a permanent sentinel sits at `head`, a push
//! links a node after the current last node and then swings `tail`, and a pop
//! advances `head` past the sentinel and takes the value out of the node that
//! becomes the new sentinel. Threads that observe a lagging `tail` help move it
//! forward before retrying.
//!
//! Retired sentinels are handed to `crossbeam-epoch` and only freed once no
//! pinned thread can still be reading them.
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};

struct Node<T> {
    /// Initialised for every node except the sentinel; read exactly once, by
    /// the pop that retires the node before it.
    data: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

pub struct LockFreeQueue<T> {
    head: Atomic<Node<T>>,
    tail: Atomic<Node<T>>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    pub fn new() -> Self {
        let queue = Self {
            head: Atomic::null(),
            tail: Atomic::null(),
        };
        let sentinel = Owned::new(Node {
            data: MaybeUninit::uninit(),
            next: Atomic::null(),
        });
        // Not yet shared with any other thread.
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = sentinel.into_shared(guard);
            queue.head.store(sentinel, Relaxed);
            queue.tail.store(sentinel, Relaxed);
        }
        queue
    }

    /// Appends `value` at the tail.
    pub fn push(&self, value: T) {
        let guard = &epoch::pin();
        let new = Owned::new(Node {
            data: MaybeUninit::new(value),
            next: Atomic::null(),
        })
        .into_shared(guard);

        loop {
            let tail = self.tail.load(Acquire, guard);
            // SAFETY: tail is never null and is protected by the guard.
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Acquire, guard);

            if !next.is_null() {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Release, Relaxed, guard);
                continue;
            }

            if tail_ref
                .next
                .compare_exchange(Shared::null(), new, Release, Relaxed, guard)
                .is_ok()
            {
                let _ = self
                    .tail
                    .compare_exchange(tail, new, Release, Relaxed, guard);
                return;
            }
        }
    }

    /// Removes the value at the head, or returns `None` when the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = &epoch::pin();
        loop {
            let head = self.head.load(Acquire, guard);
            // SAFETY: head is never null and is protected by the guard.
            let next = unsafe { head.deref() }.next.load(Acquire, guard);
            // SAFETY: a non-null next was published with Release by `push`.
            let next_ref = unsafe { next.as_ref() }?;

            let tail = self.tail.load(Relaxed, guard);
            if head == tail {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Release, Relaxed, guard);
            }

            if self
                .head
                .compare_exchange(head, next, Release, Relaxed, guard)
                .is_ok()
            {
                // SAFETY: winning the head CAS makes this thread the only reader
                // of `next.data`; `head` is unreachable from the queue now.
                unsafe {
                    guard.defer_destroy(head);
                    return Some(next_ref.data.assume_init_read());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Acquire, guard);
        // SAFETY: head is never null and is protected by the guard.
        unsafe { head.deref() }.next.load(Acquire, guard).is_null()
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can touch the queue.
        unsafe {
            let guard = epoch::unprotected();
            while self.pop_unprotected(guard).is_some() {}
            let sentinel = self.head.load(Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}

impl<T> LockFreeQueue<T> {
    /// Single-threaded pop used while dropping; frees the retired node at once.
    unsafe fn pop_unprotected(&self, guard: &epoch::Guard) -> Option<T> {
        let head = self.head.load(Relaxed, guard);
        let next = head.deref().next.load(Relaxed, guard);
        let next_ref = next.as_ref()?;
        self.head.store(next, Relaxed);
        drop(head.into_owned());
        Some(next_ref.data.assume_init_read())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn fifo_order_single_thread() {
        let queue = LockFreeQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None::<u32>);

        for value in 0..10 {
            queue.push(value);
        }
        assert!(!queue.is_empty());
        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn interleaved_push_pop() {
        let queue = LockFreeQueue::new();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.pop(), Some("a"));
        queue.push("c");
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), Some("c"));
        assert_eq!(queue.pop(), None);
    }

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn drop_releases_remaining_values() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let queue = LockFreeQueue::new();
            for _ in 0..5 {
                queue.push(Tracked(drops.clone()));
            }
            drop(queue.pop());
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn concurrent_producers_and_consumers_see_every_value_once() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 10_000;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let queue = Arc::new(LockFreeQueue::new());
        let popped = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.push(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = queue.clone();
                let popped = popped.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while popped.load(Ordering::SeqCst) < TOTAL {
                        match queue.pop() {
                            Some(value) => {
                                popped.fetch_add(1, Ordering::SeqCst);
                                seen.push(value);
                            }
                            None => thread::yield_now(),
                        }
                    }
                    seen
                })
            })
            .collect();

        for handle in producers {
            handle.join().unwrap();
        }
        let mut all = HashSet::with_capacity(TOTAL);
        for handle in consumers {
            let seen = handle.join().unwrap();
            // Values from one producer stay in order for any single consumer.
            let mut last = vec![None; PRODUCERS];
            for value in seen {
                let producer = value / PER_PRODUCER;
                assert!(last[producer].map_or(true, |prev| prev < value));
                last[producer] = Some(value);
                assert!(all.insert(value), "value {value} popped twice");
            }
        }
        assert_eq!(all.len(), TOTAL);
        assert!(queue.is_empty());
    }
}
