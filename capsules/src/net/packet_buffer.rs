//! A reference-counted packet-buffer allocator and the header-list ring
//! built on top of it.
//!
//! There is no heap here: a `PacketBufferPool` owns a fixed set of
//! statically-sized buffer slots (sized for the largest datagram this crate
//! ever reassembles, `sixlowpan::MAX_DATAGRAM_SIZE`) and hands out
//! `PacketBuffer` handles that track their own use count. A send or a
//! reassembly walks its headers as a `List` of `HeaderNode`s rather than
//! copying payload between layers.

use core::cell::Cell;
use kernel::common::cells::TakeCell;
use kernel::common::list::{List, ListLink, ListNode};
use kernel::ReturnCode;

/// Tags a `HeaderNode`'s payload so a list walk (e.g. `advance`, a send
/// traversal) knows what it is looking at without downcasting.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProtocolId {
    Ipv6,
    Sixlowpan,
    Udp,
    Tcp,
    Unknown,
}

/// A single held buffer slice, reference-counted so several layers can
/// share it without copying.
pub struct PacketBuffer<'a> {
    storage: TakeCell<'a, [u8]>,
    use_count: Cell<usize>,
}

impl<'a> PacketBuffer<'a> {
    const fn empty() -> PacketBuffer<'a> {
        PacketBuffer {
            storage: TakeCell::empty(),
            use_count: Cell::new(0),
        }
    }

    pub fn is_free(&self) -> bool {
        self.use_count.get() == 0
    }

    pub fn capacity(&self) -> usize {
        self.storage.map_or(0, |buf| buf.len())
    }

    /// Raises the use count; the buffer is not released until a matching
    /// number of `release` calls have been made.
    pub fn hold(&self) {
        self.use_count.set(self.use_count.get() + 1);
    }

    /// Lowers the use count; at zero the slot becomes available again to
    /// `PacketBufferPool::alloc`.
    pub fn release(&self) {
        let count = self.use_count.get();
        if count > 0 {
            self.use_count.set(count - 1);
        }
    }

    /// Runs `f` over the held bytes. No-op (returns `None`) if the slot is
    /// currently unheld.
    pub fn map<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        self.storage.map(f)
    }

    /// Bounded copy of `src` into this buffer starting at `offset`; copies
    /// `min(src.len(), capacity - offset)` bytes and returns that count.
    pub fn copy(&self, offset: usize, src: &[u8]) -> usize {
        self.storage
            .map(|buf| {
                if offset >= buf.len() {
                    return 0;
                }
                let n = core::cmp::min(src.len(), buf.len() - offset);
                buf[offset..offset + n].copy_from_slice(&src[..n]);
                n
            })
            .unwrap_or(0)
    }
}

/// A fixed pool of `N` buffer slots, each backed by board-owned `'static`
/// storage. `N` and the per-slot size are chosen by the board at
/// construction; this crate's default is sized off
/// `sixlowpan::MAX_DATAGRAM_SIZE`.
pub struct PacketBufferPool<'a> {
    buffers: &'a [PacketBuffer<'a>],
}

impl<'a> PacketBufferPool<'a> {
    pub fn new(buffers: &'a [PacketBuffer<'a>]) -> PacketBufferPool<'a> {
        PacketBufferPool { buffers }
    }

    /// Claims the first free slot whose capacity is at least `n` bytes,
    /// setting its use count to 1. `OutOfBuffers` if none is free or large
    /// enough; callers must not leak a slice they already hold when this
    /// fails partway through a multi-allocation operation.
    pub fn alloc(&self, n: usize, storage: &'a mut [u8]) -> Result<&'a PacketBuffer<'a>, ReturnCode> {
        for buf in self.buffers {
            if buf.is_free() {
                if storage.len() < n {
                    return Err(ReturnCode::ESIZE);
                }
                buf.storage.put(Some(storage));
                buf.use_count.set(1);
                return Ok(buf);
            }
        }
        Err(ReturnCode::OutOfBuffers)
    }

    pub fn free_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_free()).count()
    }
}

/// One node in a header-list ring: a protocol tag and the header's bytes,
/// owned by whoever allocated them (a `PacketBuffer` or board-static
/// storage). A send traverses the ring outward-in without copying payload
/// between layers; `advance` loops back to the head after a full pass.
pub struct HeaderNode<'a> {
    pub protocol: ProtocolId,
    payload: TakeCell<'a, [u8]>,
    next: ListLink<'a, HeaderNode<'a>>,
}

impl<'a> HeaderNode<'a> {
    pub const fn new(protocol: ProtocolId) -> HeaderNode<'a> {
        HeaderNode {
            protocol,
            payload: TakeCell::empty(),
            next: ListLink::empty(),
        }
    }

    pub fn set_payload(&self, payload: &'a mut [u8]) {
        self.payload.replace(payload);
    }

    pub fn map<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        self.payload.map(f)
    }

    pub fn len(&self) -> usize {
        self.payload.map_or(0, |buf| buf.len())
    }
}

impl<'a> ListNode<'a, HeaderNode<'a>> for HeaderNode<'a> {
    fn next(&'a self) -> &'a ListLink<'a, HeaderNode<'a>> {
        &self.next
    }
}

/// A ring of header nodes, e.g. `[Ipv6][Udp]` waiting to be serialized
/// outward. `add`/`remove` splice the ring; `advance` rotates a cursor.
pub struct HeaderList<'a> {
    nodes: List<'a, HeaderNode<'a>>,
}

impl<'a> HeaderList<'a> {
    pub const fn new() -> HeaderList<'a> {
        HeaderList { nodes: List::new() }
    }

    pub fn add(&self, node: &'a HeaderNode<'a>) {
        self.nodes.push_head(node);
    }

    /// Splices `node` out of the ring. Returns `false` if it was not a
    /// member (e.g. already removed), which callers treat as a no-op.
    pub fn remove(&self, node: &'a HeaderNode<'a>) -> bool {
        self.nodes.remove(node)
    }

    /// The node following `node` in the ring, wrapping back to the head once
    /// `node` is the last one. A cursor walking the ring with `advance`
    /// never runs off the end; it just loops.
    pub fn advance(&self, node: &'a HeaderNode<'a>) -> Option<&'a HeaderNode<'a>> {
        self.nodes.next_or_wrap(node)
    }

    pub fn head(&self) -> Option<&'a HeaderNode<'a>> {
        self.nodes.head()
    }

    /// Total bytes of every node currently in the list.
    pub fn total_len(&self) -> usize {
        self.nodes.iter().map(|n| n.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a HeaderNode<'a>> {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_fails_when_pool_exhausted() {
        let slots = [PacketBuffer::empty()];
        let pool = PacketBufferPool::new(&slots);
        let mut storage = [0u8; 16];
        assert!(pool.alloc(8, &mut storage).is_ok());
        let mut storage2 = [0u8; 16];
        match pool.alloc(8, &mut storage2) {
            Err(ReturnCode::OutOfBuffers) => {}
            _ => panic!("expected OutOfBuffers"),
        }
    }

    #[test]
    fn release_frees_the_slot_for_reuse() {
        let slots = [PacketBuffer::empty()];
        let pool = PacketBufferPool::new(&slots);
        let mut storage = [0u8; 16];
        let buf = pool.alloc(8, &mut storage).unwrap();
        buf.release();
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn hold_delays_reclaim_until_matching_release() {
        let slots = [PacketBuffer::empty()];
        let pool = PacketBufferPool::new(&slots);
        let mut storage = [0u8; 16];
        let buf = pool.alloc(8, &mut storage).unwrap();
        buf.hold();
        buf.release();
        assert!(!buf.is_free());
        buf.release();
        assert!(buf.is_free());
    }

    #[test]
    fn header_list_tracks_total_length() {
        let a = HeaderNode::new(ProtocolId::Ipv6);
        let mut a_payload = [0u8; 40];
        a.set_payload(&mut a_payload);
        let b = HeaderNode::new(ProtocolId::Udp);
        let mut b_payload = [0u8; 8];
        b.set_payload(&mut b_payload);

        let list = HeaderList::new();
        list.add(&a);
        list.add(&b);
        assert_eq!(list.total_len(), 48);
    }

    #[test]
    fn remove_splices_a_node_out_of_the_ring() {
        let a = HeaderNode::new(ProtocolId::Ipv6);
        let b = HeaderNode::new(ProtocolId::Udp);

        let list = HeaderList::new();
        list.add(&b);
        list.add(&a);
        assert!(list.remove(&b));
        assert_eq!(list.iter().count(), 1);
        assert_eq!(list.head().unwrap().protocol, ProtocolId::Ipv6);
    }

    #[test]
    fn advance_wraps_back_to_the_head() {
        let a = HeaderNode::new(ProtocolId::Ipv6);
        let b = HeaderNode::new(ProtocolId::Udp);

        let list = HeaderList::new();
        list.add(&b);
        list.add(&a);
        assert_eq!(list.advance(&a).unwrap().protocol, ProtocolId::Udp);
        assert_eq!(list.advance(&b).unwrap().protocol, ProtocolId::Ipv6);
    }
}
