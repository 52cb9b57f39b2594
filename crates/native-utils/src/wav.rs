use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// Encodes f32 samples (-1.0..=1.0) as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> anyhow::Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(sample_i16)?;
        }
        writer.finalize()?;
    }

    tracing::debug!(
        "Encoded {} samples at {} Hz into WAV",
        samples.len(),
        sample_rate
    );
    Ok(cursor.into_inner())
}
