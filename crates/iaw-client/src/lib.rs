//! Immich REST client
//!
//! [`AlbumApi`] is the seam the poll coordinator depends on;
//! [`ImmichClient`] implements it over HTTP with the `x-api-key` header.
//! Transport failures surface as [`ClientError::Communication`], a 404 on an
//! album as [`AlbumFetch::NotFound`], and shared-link writes report a plain
//! success flag after logging the failure detail.

mod api;
mod error;
mod immich;

pub use api::{AlbumApi, AlbumFetch};
pub use error::{ClientError, ClientResult};
pub use immich::{ImmichClient, API_KEY_HEADER, REQUEST_TIMEOUT};
