//! Subcommand handlers.
//!
//! | File         | Invocation           | Description                          |
//! |--------------|----------------------|--------------------------------------|
//! | `backup.rs`  | `compress_encrypt`   | `tar \| openssl enc` into a file      |
//! | `restore.rs` | `decrypt_decompress` | `openssl enc -d \| tar -x` into a dir |
//! | `upload.rs`  | `send_to_backblaze`  | `rclone copy`                        |

pub mod backup;
pub mod restore;
pub mod upload;
