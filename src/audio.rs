//! Background sound loop.
//!
//! Native builds decode the clip with `rodio` and play it on the default
//! output device. The web build hands the URL to an `<audio>` element, which
//! streams and decodes it itself.

use crate::config::AudioConfig;

/// Clamps a configured volume to the range audio backends accept.
pub fn playback_volume(config: &AudioConfig) -> f32 {
    if config.volume.is_finite() {
        config.volume.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// A playing sound. Playback stops when this is dropped.
#[cfg(not(target_arch = "wasm32"))]
pub struct BackgroundAudio {
    // Dropping the stream closes the output device.
    _stream: rodio::OutputStream,
    sink: rodio::Sink,
}

#[cfg(not(target_arch = "wasm32"))]
impl BackgroundAudio {
    /// Decodes `bytes` (mp3, ogg, flac or wav) and starts playing immediately.
    pub fn from_bytes(bytes: Vec<u8>, config: &AudioConfig) -> anyhow::Result<Self> {
        use anyhow::Context as _;
        use rodio::Source;

        let (stream, handle) =
            rodio::OutputStream::try_default().context("No audio output device")?;
        let sink = rodio::Sink::try_new(&handle).context("Cannot open an audio sink")?;
        let source = rodio::Decoder::new(std::io::Cursor::new(bytes))
            .with_context(|| format!("Cannot decode {}", config.url))?;

        if config.looping {
            sink.append(source.repeat_infinite());
        } else {
            sink.append(source);
        }
        sink.set_volume(playback_volume(config));
        sink.play();
        log::info!("Playing {}", config.url);

        Ok(Self {
            _stream: stream,
            sink,
        })
    }
}

#[cfg(target_arch = "wasm32")]
pub struct BackgroundAudio {
    element: web_sys::HtmlAudioElement,
}

#[cfg(target_arch = "wasm32")]
impl BackgroundAudio {
    /// Starts streaming `config.url`. Browsers may hold playback back until
    /// the first user interaction; that is logged, not treated as an error.
    pub fn from_url(config: &AudioConfig) -> anyhow::Result<Self> {
        let element = web_sys::HtmlAudioElement::new_with_src(&config.url)
            .map_err(|e| anyhow::anyhow!("Cannot create an audio element: {e:?}"))?;
        element.set_loop(config.looping);
        element.set_volume(playback_volume(config) as f64);

        let promise = element
            .play()
            .map_err(|e| anyhow::anyhow!("Cannot start {}: {e:?}", config.url))?;
        let url = config.url.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
                log::warn!("Playback of {url} was blocked: {e:?}");
            }
        });
        log::info!("Playing {}", config.url);

        Ok(Self { element })
    }
}

#[cfg(target_arch = "wasm32")]
impl Drop for BackgroundAudio {
    fn drop(&mut self) {
        let _ = self.element.pause();
    }
}
