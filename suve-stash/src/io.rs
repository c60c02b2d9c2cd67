use std::path::Path;

use suve_record::State;
use tokio::io::AsyncWriteExt;

use crate::DISCRIMINATOR_ENCRYPTED;
use crate::DISCRIMINATOR_PLAINTEXT;
use crate::StashError;
use crate::envelope;

/// Load a stash file. `passphrase` is required iff the file is encrypted;
/// giving one for a plaintext file is harmless and ignored.
pub async fn load(path: &Path, passphrase: Option<&str>) -> Result<State, StashError> {
    let bytes = tokio::fs::read(path).await?;
    let (discriminator, body) = bytes.split_first().ok_or(StashError::Truncated)?;

    let json = match *discriminator {
        DISCRIMINATOR_PLAINTEXT => body.to_vec(),
        DISCRIMINATOR_ENCRYPTED => {
            let passphrase = passphrase.ok_or(StashError::NeedsPassphrase)?;
            envelope::decrypt(body, passphrase)?
        }
        other => return Err(StashError::UnknownDiscriminator(other)),
    };

    Ok(serde_json::from_slice(&json)?)
}

/// Save a stash file atomically: write to a sibling `.tmp` path, `fsync`,
/// then `rename` over the destination, applied here as a one-shot write
/// instead of an append-only stream.
pub async fn save(path: &Path, state: &State, passphrase: Option<&str>) -> Result<(), StashError> {
    let json = serde_json::to_vec(state)?;

    let mut out = Vec::with_capacity(json.len() + 1);
    match passphrase {
        None => {
            out.push(DISCRIMINATOR_PLAINTEXT);
            out.extend_from_slice(&json);
        }
        Some(pw) => {
            out.push(DISCRIMINATOR_ENCRYPTED);
            out.extend_from_slice(&envelope::encrypt(&json, pw)?);
        }
    }

    let tmp_path = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .await?;
    file.write_all(&out).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
