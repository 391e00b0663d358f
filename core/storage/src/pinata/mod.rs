//! Pinata pinning service backend.

mod adapter;
mod client;

pub use adapter::PinataAdapter;
pub use client::{HttpPinataClient, PinResponse, PinataApi, PinataConfig, PinnedItem};
