use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
const HEX: &[u8; 16] = b"0123456789abcdef";

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Process-unique id for a tool call the model did not name, `call_<16 hex>`.
#[inline]
pub(crate) fn next_call_id() -> String {
    let id = CALL_ID_COUNTER.fetch_add(1, Ordering::Relaxed) ^ fastrand::u64(..) << 32;
    format_seq_hex("call_", id)
}

#[inline]
pub(crate) fn format_seq_hex(prefix: &str, seq: u64) -> String {
    let mut out = String::with_capacity(prefix.len() + 16);
    out.push_str(prefix);
    push_u64_hex_16(&mut out, seq);
    out
}

#[inline]
fn push_u64_hex_16(out: &mut String, mut value: u64) {
    let mut buf = [b'0'; 16];
    let mut idx = 16;
    while idx > 0 {
        idx -= 1;
        let nibble = usize::try_from(value & 0x0f).unwrap_or(0);
        buf[idx] = HEX[nibble];
        value >>= 4;
    }
    for byte in buf {
        out.push(char::from(byte));
    }
}
