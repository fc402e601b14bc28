//! Domain Layer
//!
//! Ports the cache core is written against.

pub mod ports;

pub use ports::{Loader, LoaderFn, PeerGetter, PeerPicker};
