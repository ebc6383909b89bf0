//! WAV encoding for speech-to-text uploads

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// Encode one recording span as a mono PCM16 WAV payload
pub(crate) fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::STT_SAMPLE_RATE;

    #[test]
    fn test_encode_produces_riff_wave_header() {
        let bytes = encode_wav(&[0i16; 160], STT_SAMPLE_RATE).expect("encoding failed");
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn test_encoded_wav_round_trips() {
        let samples: Vec<i16> = (0..320).map(|i| (i * 7) as i16).collect();
        let bytes = encode_wav(&samples, STT_SAMPLE_RATE).expect("encoding failed");

        let mut reader =
            hound::WavReader::new(Cursor::new(bytes)).expect("encoded payload must parse");
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, STT_SAMPLE_RATE);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_empty_span_still_encodes() {
        let bytes = encode_wav(&[], STT_SAMPLE_RATE).expect("encoding failed");
        assert!(bytes.len() >= 44, "header must be complete");
    }
}
