//! On-disk stash codec. A stash file is a single-byte format discriminator
//! followed by either plain JSON or an AES-256-GCM envelope keyed by an
//! Argon2id-derived passphrase.

mod envelope;
mod io;

pub use envelope::decrypt;
pub use envelope::encrypt;
pub use io::load;
pub use io::save;

use suve_record::Service;
use suve_record::State;

/// `0x01 || salt(16) || nonce(12) || ciphertext+tag`.
pub const DISCRIMINATOR_PLAINTEXT: u8 = 0x00;
pub const DISCRIMINATOR_ENCRYPTED: u8 = 0x01;

#[derive(Debug, thiserror::Error)]
pub enum StashError {
    #[error("stash is encrypted; a passphrase is required")]
    NeedsPassphrase,

    #[error("incorrect passphrase, or the stash file is corrupt")]
    BadPassphrase,

    #[error("unrecognized stash file format discriminator: {0:#x}")]
    UnknownDiscriminator(u8),

    #[error("stash file is truncated")]
    Truncated,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Restrict a loaded `State` to one service.
pub fn filter(state: &State, service: Service) -> State {
    state.filtered(Some(service))
}
