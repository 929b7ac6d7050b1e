//! Chunked jingle streaming: read a stored audio file and push it to one
//! buzzer as ordered, length-prefixed binary frames.
//!
//! One stream per buzzer at a time; the chunk sequence is produced by a
//! single task, so frames can never interleave or reorder.

use std::path::{Component, Path, PathBuf};

use tokio::{fs::File, io::AsyncReadExt};
use tracing::{info, warn};

use crate::{
    dto::ws::{JINGLE_CHUNK_SIZE, ServerMessage, encode_jingle_frame},
    services::broadcast,
    state::SharedState,
};

/// Handle a `JINGLE_PLAY` request from the console.
pub async fn play(state: SharedState, buzzer_id: String, jingle_id: u32) {
    // Claiming the slot first makes the single-stream check atomic.
    if !state.begin_jingle_stream(&buzzer_id, jingle_id) {
        report_error(&state, &buzzer_id, jingle_id, "already playing");
        return;
    }

    let Some(peer) = state.registry().buzzer(&buzzer_id) else {
        state.end_jingle_stream(&buzzer_id);
        report_error(&state, &buzzer_id, jingle_id, "not connected");
        return;
    };
    if peer.tx.is_closed() {
        state.end_jingle_stream(&buzzer_id);
        report_error(&state, &buzzer_id, jingle_id, "not connected");
        return;
    }

    let jingle = match state.jingle_store().find_jingle(jingle_id).await {
        Ok(Some(jingle)) => jingle,
        Ok(None) => {
            state.end_jingle_stream(&buzzer_id);
            report_error(&state, &buzzer_id, jingle_id, "jingle not found");
            return;
        }
        Err(err) => {
            warn!(jingle_id, error = %err, "jingle lookup failed");
            state.end_jingle_stream(&buzzer_id);
            report_error(&state, &buzzer_id, jingle_id, "jingle not found");
            return;
        }
    };

    let Some(path) = resolve_jingle_path(&state.config().jingle_root, &jingle.path) else {
        warn!(jingle_id, stored = %jingle.path, "jingle path escapes the jingle root");
        state.end_jingle_stream(&buzzer_id);
        report_error(&state, &buzzer_id, jingle_id, "invalid file path");
        return;
    };

    let file_size = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata.len(),
        Err(_) => {
            state.end_jingle_stream(&buzzer_id);
            report_error(&state, &buzzer_id, jingle_id, "file not found");
            return;
        }
    };

    let format = path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or("")
        .to_string();

    broadcast::send_to_buzzer(
        &state,
        &buzzer_id,
        ServerMessage::JingleStart {
            jingle_id,
            name: jingle.name.clone(),
            format,
            file_size,
        },
    );
    broadcast::send_to_console(
        &state,
        ServerMessage::JingleStarted {
            buzzer_id: buzzer_id.clone(),
            jingle_id,
            name: jingle.name.clone(),
            file_size,
        },
    );

    match stream_file(&state, &buzzer_id, jingle_id, &path).await {
        Ok(Some(total_chunks)) => {
            state.end_jingle_stream(&buzzer_id);
            info!(buzzer_id, jingle_id, total_chunks, "jingle stream completed");
            broadcast::send_to_buzzer(
                &state,
                &buzzer_id,
                ServerMessage::JingleEnd {
                    jingle_id,
                    total_chunks,
                    file_size,
                },
            );
            broadcast::send_to_console(
                &state,
                ServerMessage::JingleCompleted {
                    buzzer_id: buzzer_id.clone(),
                    jingle_id,
                    total_chunks,
                },
            );
        }
        // Transport went away mid-stream: no end-of-stream signal either way.
        Ok(None) => {
            state.end_jingle_stream(&buzzer_id);
            warn!(buzzer_id, jingle_id, "jingle stream aborted, buzzer unreachable");
        }
        Err(err) => {
            state.end_jingle_stream(&buzzer_id);
            warn!(buzzer_id, jingle_id, error = %err, "jingle read failed");
            report_error(&state, &buzzer_id, jingle_id, &format!("read failed: {err}"));
        }
    }
}

/// Push the file as ordered chunks. `Ok(Some(n))` on full delivery,
/// `Ok(None)` when the transport stopped accepting frames.
async fn stream_file(
    state: &SharedState,
    buzzer_id: &str,
    jingle_id: u32,
    path: &Path,
) -> std::io::Result<Option<u32>> {
    let mut file = File::open(path).await?;
    let mut buffer = vec![0u8; JINGLE_CHUNK_SIZE];
    let mut chunk_index: u32 = 0;

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            return Ok(Some(chunk_index));
        }
        let frame = encode_jingle_frame(jingle_id, chunk_index, &buffer[..read]);
        if !broadcast::send_binary_to_buzzer(state, buzzer_id, frame) {
            return Ok(None);
        }
        chunk_index += 1;
    }
}

/// Tell the console a stream did not run (or died), naming the buzzer.
fn report_error(state: &SharedState, buzzer_id: &str, jingle_id: u32, error: &str) {
    broadcast::send_to_console(
        state,
        ServerMessage::JingleError {
            buzzer_id: Some(buzzer_id.to_string()),
            jingle_id: Some(jingle_id),
            error: error.to_string(),
        },
    );
}

/// Resolve a stored jingle path against the configured root, rejecting any
/// form that escapes it.
fn resolve_jingle_path(root: &Path, stored: &str) -> Option<PathBuf> {
    let stored_path = Path::new(stored);
    let relative = if stored_path.is_absolute() {
        stored_path.strip_prefix(root).ok()?
    } else {
        stored_path
    };

    let mut resolved = root.to_path_buf();
    let mut depth: usize = 0;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}
