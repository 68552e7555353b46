//! Fixed-capacity single-producer/single-consumer ring of audio buffers.
//!
//! This bridges two independently clocked threads: a hardware capture
//! callback (the producer) and the pull graph's render callback (the
//! consumer). Neither side ever blocks. The write side always succeeds and
//! favors latest-data-wins: if the reader falls a full lap behind, the
//! oldest unread slot is dropped rather than stalling capture. The read
//! side fails fast when no unread data is available, which is how a
//! consumer detects underrun.
//!
//! Slots are filled before they are published. The writer fills the slot at
//! its cursor in place and only then release-stores the advanced cursor, so
//! the reader can never claim a slot that is still being written. The
//! reader copies the slot at its cursor and consumes it with a
//! compare-exchange; if the writer reclaimed that slot mid-copy the
//! exchange fails and the copy is discarded and retried, so a torn slot is
//! never returned.
//!
//! The write cursor is stored to only by the capture thread and the read
//! cursor only by the render thread (plus the writer's drop-oldest push,
//! which is why both cursor moves that can race use compare-exchange).
//! That ownership is enforced by handing out split [`RingWriter`] /
//! [`RingReader`] halves. Slot shape is fixed at construction; captures
//! shorter than a slot leave the tail of that slot stale.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::BufferList;

struct Shared {
    slots: Box<[UnsafeCell<BufferList>]>,
    read: AtomicU64,
    write: AtomicU64,
}

// Slot access is partitioned by the cursor protocol: the writer only
// touches the unpublished slot at its write cursor, and a reader copy that
// overlapped a reclaim fails its consume and is thrown away.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// The capture-thread half. Owns the write cursor.
pub struct RingWriter {
    shared: Arc<Shared>,
    slots: u64,
}

/// The render-thread half. Owns the read cursor.
pub struct RingReader {
    shared: Arc<Shared>,
    slots: u64,
}

/// Allocate a ring of `slots` pre-sized buffer lists and split it into its
/// producer and consumer halves.
pub fn ring_buffer(slots: usize, channels: usize, frames: usize) -> (RingWriter, RingReader) {
    assert!(slots >= 2, "ring buffer needs at least two slots");
    let slots_vec: Vec<UnsafeCell<BufferList>> = (0..slots)
        .map(|_| UnsafeCell::new(BufferList::new(channels, frames)))
        .collect();
    let shared = Arc::new(Shared {
        slots: slots_vec.into_boxed_slice(),
        read: AtomicU64::new(0),
        write: AtomicU64::new(0),
    });
    (
        RingWriter {
            shared: shared.clone(),
            slots: slots as u64,
        },
        RingReader {
            shared,
            slots: slots as u64,
        },
    )
}

impl RingWriter {
    /// The unpublished slot at the write cursor, for in-place fill. Call
    /// this first, then publish with [`RingWriter::advance_write_head`].
    ///
    /// If the ring is full, the oldest unread slot aliases the write slot
    /// and is dropped here, before the fill, so capture never waits on the
    /// consumer.
    pub fn write_head(&mut self) -> &mut BufferList {
        let write = self.shared.write.load(Ordering::Relaxed);
        let read = self.shared.read.load(Ordering::Acquire);
        if write.wrapping_sub(read) >= self.slots {
            // CAS because the reader may consume the slot concurrently, in
            // which case the ring is no longer full and nothing needs
            // dropping.
            let _ = self.shared.read.compare_exchange(
                read,
                read + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        let index = (write % self.slots) as usize;
        unsafe { &mut *self.shared.slots[index].get() }
    }

    /// Publish the slot filled via [`RingWriter::write_head`], making it
    /// visible to the reader. Always succeeds.
    pub fn advance_write_head(&mut self) {
        let write = self.shared.write.load(Ordering::Relaxed);
        self.shared.write.store(write + 1, Ordering::Release);
    }
}

impl RingReader {
    /// Copy the oldest unread slot into `dst` and consume it. Returns
    /// `false` without moving the cursor when the ring is empty.
    ///
    /// Consuming validates the copy: if the writer dropped this slot to
    /// reclaim it while the copy was in flight, the exchange fails and the
    /// copy is redone from the next slot. After a `true` return, `dst`
    /// holds exactly one published slot, never a torn one.
    pub fn read_into(&mut self, dst: &mut BufferList) -> bool {
        loop {
            let read = self.shared.read.load(Ordering::Acquire);
            let write = self.shared.write.load(Ordering::Acquire);
            if read == write {
                return false;
            }
            let index = (read % self.slots) as usize;
            let slot = unsafe { &*self.shared.slots[index].get() };
            dst.resize_frames(slot.frames());
            dst.copy_from(slot);
            if self
                .shared
                .read
                .compare_exchange(read, read + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(writer: &mut RingWriter, value: f32) {
        for channel in writer.write_head().iter_channels_mut() {
            channel.fill(value);
        }
        writer.advance_write_head();
    }

    fn pop(reader: &mut RingReader, dst: &mut BufferList) -> Option<f32> {
        reader.read_into(dst).then(|| dst.channel(0)[0])
    }

    #[test]
    fn reads_return_slots_in_write_order() {
        let (mut writer, mut reader) = ring_buffer(3, 2, 8);
        for v in 1..=3 {
            push(&mut writer, v as f32);
        }
        let mut dst = BufferList::new(2, 8);
        for v in 1..=3 {
            assert_eq!(pop(&mut reader, &mut dst), Some(v as f32));
        }
    }

    #[test]
    fn read_past_write_fails_without_moving() {
        let (mut writer, mut reader) = ring_buffer(3, 1, 4);
        let mut dst = BufferList::new(1, 4);
        assert_eq!(pop(&mut reader, &mut dst), None);

        push(&mut writer, 1.0);
        assert_eq!(pop(&mut reader, &mut dst), Some(1.0));
        assert_eq!(pop(&mut reader, &mut dst), None);

        // A later write makes the next read succeed again.
        push(&mut writer, 2.0);
        assert_eq!(pop(&mut reader, &mut dst), Some(2.0));
    }

    #[test]
    fn writer_overwrites_oldest_unread_slot() {
        let (mut writer, mut reader) = ring_buffer(3, 1, 4);
        for v in 1..=4 {
            push(&mut writer, v as f32);
        }
        // The first write was dropped; the survivors arrive in order.
        let mut dst = BufferList::new(1, 4);
        assert_eq!(pop(&mut reader, &mut dst), Some(2.0));
        assert_eq!(pop(&mut reader, &mut dst), Some(3.0));
        assert_eq!(pop(&mut reader, &mut dst), Some(4.0));
        assert_eq!(pop(&mut reader, &mut dst), None);
    }

    #[test]
    fn slots_are_preallocated_to_shape() {
        let (mut writer, _reader) = ring_buffer(3, 2, 512);
        assert_eq!(writer.write_head().channels(), 2);
        assert_eq!(writer.write_head().frames(), 512);
    }

    #[test]
    fn unpublished_slots_are_never_readable() {
        let (mut writer, mut reader) = ring_buffer(3, 1, 4);
        writer.write_head().channel_mut(0).fill(9.0);

        // Filled but not yet published: invisible to the reader.
        let mut dst = BufferList::new(1, 4);
        assert!(!reader.read_into(&mut dst));

        writer.advance_write_head();
        assert!(reader.read_into(&mut dst));
        assert_eq!(dst.channel(0), &[9.0; 4]);
    }

    #[test]
    fn reads_never_observe_partially_filled_slots() {
        // Every published slot is uniform, so any mix of two fills in one
        // read shows up as a non-uniform buffer.
        let (mut writer, mut reader) = ring_buffer(3, 1, 4096);
        let producer = std::thread::spawn(move || {
            for v in 1..=2_000 {
                writer.write_head().channel_mut(0).fill(v as f32);
                writer.advance_write_head();
            }
        });
        let mut dst = BufferList::new(1, 4096);
        for _ in 0..2_000 {
            if reader.read_into(&mut dst) {
                let first = dst.channel(0)[0];
                assert!(dst.channel(0).iter().all(|&s| s == first));
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn concurrent_writer_never_stalls() {
        let (mut writer, mut reader) = ring_buffer(3, 1, 16);
        let producer = std::thread::spawn(move || {
            for v in 0..10_000 {
                writer.write_head().channel_mut(0).fill(v as f32);
                writer.advance_write_head();
            }
        });
        let mut dst = BufferList::new(1, 16);
        let mut last = -1.0f32;
        for _ in 0..10_000 {
            if reader.read_into(&mut dst) {
                let v = dst.channel(0)[0];
                // Values only move forward; drops are allowed, reordering
                // is not.
                assert!(v > last);
                last = v;
            }
        }
        producer.join().unwrap();
    }
}
