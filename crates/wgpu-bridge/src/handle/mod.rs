//! Opaque, generation-checked handles.
//!
//! A [`Handle`] is what crosses the foreign boundary: an address-sized integer
//! that names exactly one live object in a [`HandleTable`]. Handles carry the
//! slot generation, so a handle whose object was destroyed never resolves again,
//! even after its slot has been reused.

mod table;

pub use table::{Handle, HandleTable};
