//! condogate-embed — HTTP client for the remote face embedding service.
//!
//! The service accepts `POST {base}/embed` with `{"image_base64": ...}` and an
//! optional `x-ml-key` header, and answers `{"ok": bool, "embedding": [...]}`.
//! `ok: false` means the service found no face.

mod remote;

pub use remote::{parse_embed_response, sniff_image, RemoteConfig, RemoteExtractor, API_KEY_HEADER};
