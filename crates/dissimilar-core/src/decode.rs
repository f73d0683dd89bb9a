//! Image decode services.
//!
//! Everything that turns a file path into a [`PixelBuffer`] lives behind
//! [`DecodeService`], so the pipeline never cares whether pixels came from
//! the native `image` crate or an external JPEG2000 decoder subprocess.
//! Both implementations bound their work with the configured timeout and
//! treat expiry as a decode failure.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::GenericImageView;
use tokio::time::timeout;

use crate::config::{Config, DecoderConfig, LimitsConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::types::PixelBuffer;

/// A file-in, pixel-buffer-out decode service.
#[async_trait]
pub trait DecodeService: Send + Sync {
    /// Decode the image at `path` into an RGB pixel buffer.
    async fn decode(&self, path: &Path) -> PipelineResult<PixelBuffer>;
}

/// Decoder backed by the `image` crate, with format sniffing, a dimension
/// limit and a decode timeout.
pub struct NativeDecoder {
    limits: LimitsConfig,
}

impl NativeDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Synchronous decode from bytes (runs in spawn_blocking).
    fn decode_bytes_sync(bytes: Vec<u8>, path: &Path) -> PipelineResult<PixelBuffer> {
        use std::io::Cursor;

        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {}", e),
            })?;
        let image = reader.decode().map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        let greyscale = matches!(
            image.color(),
            image::ColorType::L8
                | image::ColorType::L16
                | image::ColorType::La8
                | image::ColorType::La16
        );
        let samples = image.into_rgb8().into_raw();

        Ok(PixelBuffer {
            width,
            height,
            greyscale,
            samples,
        })
    }

    fn check_dimensions(&self, buffer: &PixelBuffer, path: &Path) -> PipelineResult<()> {
        if buffer.width > self.limits.max_image_dimension
            || buffer.height > self.limits.max_image_dimension
        {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width: buffer.width,
                height: buffer.height,
                max_dim: self.limits.max_image_dimension,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DecodeService for NativeDecoder {
    async fn decode(&self, path: &Path) -> PipelineResult<PixelBuffer> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let path_owned = path.to_path_buf();
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);
        let decode_result = timeout(
            timeout_duration,
            tokio::task::spawn_blocking(move || Self::decode_bytes_sync(bytes, &path_owned)),
        )
        .await;

        let buffer = match decode_result {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(PipelineError::Decode {
                    path: path.to_path_buf(),
                    message: format!("Task join error: {}", e),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    path: path.to_path_buf(),
                    timeout_ms: self.limits.decode_timeout_ms,
                })
            }
        };
        self.check_dimensions(&buffer, path)?;
        tracing::trace!(
            "Decoded {:?} ({}x{}, greyscale: {})",
            path,
            buffer.width,
            buffer.height,
            buffer.greyscale
        );
        Ok(buffer)
    }
}

/// Decoder that shells out to an external executable (JPEG2000 style).
///
/// The configured command is invoked as `command <input> <output.png>`; a
/// zero exit status means the PNG was written and is then decoded natively.
/// The subprocess is killed if the timeout expires or the future is dropped.
pub struct ExternalDecoder {
    command: String,
    limits: LimitsConfig,
    native: NativeDecoder,
}

impl ExternalDecoder {
    /// Create a new external decoder invoking `command`.
    pub fn new(command: String, limits: LimitsConfig) -> Self {
        Self {
            command,
            native: NativeDecoder::new(limits.clone()),
            limits,
        }
    }
}

#[async_trait]
impl DecodeService for ExternalDecoder {
    async fn decode(&self, path: &Path) -> PipelineResult<PixelBuffer> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }

        let workdir = tempfile::tempdir().map_err(|e| PipelineError::External {
            path: path.to_path_buf(),
            message: format!("cannot create work dir: {}", e),
        })?;
        let out_png = workdir.path().join("decoded.png");

        let run = tokio::process::Command::new(&self.command)
            .arg(path)
            .arg(&out_png)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);
        let output = match timeout(timeout_duration, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(PipelineError::External {
                    path: path.to_path_buf(),
                    message: format!("cannot spawn {}: {}", self.command, e),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    path: path.to_path_buf(),
                    timeout_ms: self.limits.decode_timeout_ms,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::External {
                path: path.to_path_buf(),
                message: format!(
                    "{} exited with {}: {}",
                    self.command,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        self.native
            .decode(&out_png)
            .await
            .map_err(|e| PipelineError::External {
                path: path.to_path_buf(),
                message: format!("decoder output unreadable: {}", e),
            })
    }
}

/// Routes decode requests by file extension: configured extensions go to
/// the external decoder (when one is configured), everything else native.
pub struct FormatRouter {
    native: NativeDecoder,
    external: Option<ExternalDecoder>,
    external_extensions: Vec<String>,
}

impl FormatRouter {
    /// Build a router from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.limits.clone(), config.decoder.clone())
    }

    /// Build a router from the limit and decoder sections.
    pub fn new(limits: LimitsConfig, decoder: DecoderConfig) -> Self {
        let external = decoder
            .command
            .map(|command| ExternalDecoder::new(command, limits.clone()));
        Self {
            native: NativeDecoder::new(limits),
            external,
            external_extensions: decoder
                .extensions
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    fn routes_externally(&self, path: &Path) -> bool {
        if self.external.is_none() {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.external_extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DecodeService for FormatRouter {
    async fn decode(&self, path: &Path) -> PipelineResult<PixelBuffer> {
        if self.routes_externally(path) {
            // checked by routes_externally
            let external = self.external.as_ref().unwrap();
            return external.decode(path).await;
        }
        self.native.decode(path).await
    }
}

/// Helper owned by callers that need both files of a pair at once.
///
/// The two decodes are independent and run concurrently; metric
/// computation requires both, so the first error wins.
pub async fn decode_pair(
    decoder: &dyn DecodeService,
    one: &Path,
    two: &Path,
) -> PipelineResult<(PixelBuffer, PixelBuffer)> {
    let (one, two) = tokio::join!(decoder.decode(one), decoder.decode(two));
    Ok((one?, two?))
}
