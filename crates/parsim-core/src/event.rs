//! # parsim-core::event
//!
//! The Event carried by links, and the rank wire codec. An event is an
//! opaque payload stamped with the tuple the receiving side needs to route
//! and order it; the wire layout is exactly that tuple.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parsim_types::{errors::SimError, time::SimTime};

/// A user event in flight.
#[derive(Clone, Debug)]
pub struct Event {
    /// Cookie identifying the receiving link half at the receiver. For local
    /// deliveries this is the arena index of the receiving half; for
    /// cross-partition deliveries it is the cookie advertised by the peer.
    pub delivery_info: u64,
    pub delivery_time: SimTime,
    pub priority: i32,
    /// The user payload, in its registered serialization.
    pub payload: Bytes,
}

/// Packs a (thread, link index) pair into a cross-partition cookie.
pub fn pack_cookie(thread: u32, link: usize) -> u64 {
    ((thread as u64) << 32) | (link as u64 & 0xffff_ffff)
}

/// Splits a cross-partition cookie back into (thread, link index).
pub fn unpack_cookie(cookie: u64) -> (u32, usize) {
    ((cookie >> 32) as u32, (cookie & 0xffff_ffff) as usize)
}

/// Encodes a block of events for one (src rank -> dst rank) pair:
/// `count: u32` followed by `count` serialized events, each
/// `(delivery_info: u64, delivery_time: u64, priority: i32, payload_len: u32,
/// payload)`.
pub fn encode_event_block(events: &[Event]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + events.len() * 24);
    buf.put_u32(events.len() as u32);
    for ev in events {
        buf.put_u64(ev.delivery_info);
        buf.put_u64(ev.delivery_time);
        buf.put_i32(ev.priority);
        buf.put_u32(ev.payload.len() as u32);
        buf.put_slice(&ev.payload);
    }
    buf.freeze()
}

/// Decodes a block produced by [`encode_event_block`].
pub fn decode_event_block(mut buf: Bytes) -> Result<Vec<Event>, SimError> {
    if buf.remaining() < 4 {
        return Err(SimError::Transport("truncated event block".to_string()));
    }
    let count = buf.get_u32() as usize;
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 24 {
            return Err(SimError::Transport("truncated event header".to_string()));
        }
        let delivery_info = buf.get_u64();
        let delivery_time = buf.get_u64();
        let priority = buf.get_i32();
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(SimError::Transport("truncated event payload".to_string()));
        }
        let payload = buf.copy_to_bytes(len);
        events.push(Event {
            delivery_info,
            delivery_time,
            priority,
            payload,
        });
    }
    Ok(events)
}

/// Encodes the per-epoch signals block: three `u32` flags (end, usr, alrm).
pub fn encode_signals(end: u32, usr: u32, alrm: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(12);
    buf.put_u32(end);
    buf.put_u32(usr);
    buf.put_u32(alrm);
    buf.freeze()
}

/// Decodes a signals block.
pub fn decode_signals(mut buf: Bytes) -> Result<(u32, u32, u32), SimError> {
    if buf.remaining() < 12 {
        return Err(SimError::Transport("truncated signals block".to_string()));
    }
    Ok((buf.get_u32(), buf.get_u32(), buf.get_u32()))
}

/// Encodes the post-wire-up link-info exchange: `(link_name, cookie)` pairs.
pub fn encode_link_info(entries: &[(String, u64)]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32(entries.len() as u32);
    for (name, cookie) in entries {
        buf.put_u16(name.len() as u16);
        buf.put_slice(name.as_bytes());
        buf.put_u64(*cookie);
    }
    buf.freeze()
}

/// Decodes a link-info block.
pub fn decode_link_info(mut buf: Bytes) -> Result<Vec<(String, u64)>, SimError> {
    if buf.remaining() < 4 {
        return Err(SimError::Transport("truncated link info block".to_string()));
    }
    let count = buf.get_u32() as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 2 {
            return Err(SimError::Transport("truncated link info entry".to_string()));
        }
        let len = buf.get_u16() as usize;
        if buf.remaining() < len + 8 {
            return Err(SimError::Transport("truncated link info entry".to_string()));
        }
        let name = String::from_utf8(buf.copy_to_bytes(len).to_vec())
            .map_err(|_| SimError::Transport("non-utf8 link name".to_string()))?;
        let cookie = buf.get_u64();
        entries.push((name, cookie));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_block_round_trips() {
        let events = vec![
            Event {
                delivery_info: pack_cookie(1, 7),
                delivery_time: 1000,
                priority: 0,
                payload: Bytes::from_static(b"ping"),
            },
            Event {
                delivery_info: 3,
                delivery_time: 2000,
                priority: -50,
                payload: Bytes::new(),
            },
        ];
        let decoded = decode_event_block(encode_event_block(&events)).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].payload, events[0].payload);
        assert_eq!(decoded[1].delivery_time, 2000);
        assert_eq!(decoded[1].priority, -50);
        assert_eq!(unpack_cookie(decoded[0].delivery_info), (1, 7));
    }

    #[test]
    fn truncated_blocks_are_rejected() {
        let events = vec![Event {
            delivery_info: 0,
            delivery_time: 5,
            priority: 0,
            payload: Bytes::from_static(b"xyz"),
        }];
        let whole = encode_event_block(&events);
        let cut = whole.slice(0..whole.len() - 2);
        assert!(decode_event_block(cut).is_err());
    }

    #[test]
    fn link_info_round_trips() {
        let entries = vec![("north".to_string(), 42), ("south".to_string(), 7)];
        let decoded = decode_link_info(encode_link_info(&entries)).unwrap();
        assert_eq!(decoded, entries);
    }
}
