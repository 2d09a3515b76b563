//! Static extraction over rendered HTML snapshots.

pub mod html;
