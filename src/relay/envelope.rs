//! Transit envelope for network hops.
//!
//! A network hop carries its content sealed: a backend that receives a
//! sealed frame only relays it and sends it straight back. The processing
//! hop carries the content bare, which is the one frame a backend works on.
//!
//! ```text
//! [4 bytes MAGIC][content]
//! ```

/// Leading bytes of a sealed frame. No supported image format starts with them.
pub const MAGIC: &[u8; 4] = b"MRT\x01";

/// Wrap `content` for a network hop.
pub fn seal(content: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MAGIC.len() + content.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(content);
    frame
}

pub fn is_sealed(frame: &[u8]) -> bool {
    frame.starts_with(MAGIC)
}

/// Content of a sealed frame, or the frame itself when it is bare.
pub fn unseal(mut frame: Vec<u8>) -> Vec<u8> {
    if is_sealed(&frame) {
        frame.drain(..MAGIC.len());
    }
    frame
}
