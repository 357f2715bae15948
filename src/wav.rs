use std::io::Read;

use anyhow::{Result, bail};

/// Format description read from a RIFF/WAVE header.
#[derive(Debug, Clone)]
pub struct WavFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_len: u64,
}

/// Parse the header chunks of a WAVE stream, leaving the reader at the
/// first byte of sample data.
pub fn read_header(reader: &mut impl Read) -> Result<WavFormat> {
    let mut riff = [0u8; 12];
    reader.read_exact(&mut riff)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE stream");
    }

    let mut fmt: Option<(u32, u16, u16)> = None;

    loop {
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let id = [header[0], header[1], header[2], header[3]];
        let len = u64::from(u32::from_le_bytes([
            header[4], header[5], header[6], header[7],
        ]));

        match &id {
            b"fmt " => {
                if len < 16 {
                    bail!("fmt chunk too short ({len} bytes)");
                }

                // chunks are word aligned
                let mut body = vec![0u8; (len + len % 2) as usize];
                reader.read_exact(&mut body)?;

                let format_tag = u16::from_le_bytes([body[0], body[1]]);
                if format_tag != 1 {
                    bail!("only PCM WAVE captures are supported (format tag {format_tag})");
                }

                fmt = Some((
                    u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
                    u16::from_le_bytes([body[2], body[3]]),
                    u16::from_le_bytes([body[14], body[15]]),
                ));
            }
            b"data" => {
                let Some((sample_rate, channels, bits_per_sample)) = fmt else {
                    bail!("data chunk before fmt chunk");
                };

                return Ok(WavFormat {
                    sample_rate,
                    channels,
                    bits_per_sample,
                    data_len: len,
                });
            }
            _ => {
                let mut remaining = len + len % 2;
                let mut scratch = [0u8; 4096];
                while remaining > 0 {
                    let take = remaining.min(scratch.len() as u64) as usize;
                    reader.read_exact(&mut scratch[..take])?;
                    remaining -= take as u64;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(sample_rate: u32, channels: u16, bits: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&36u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");

        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        let byte_rate = sample_rate * u32::from(channels) * u32::from(bits) / 8;
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        let block_align = channels * bits / 8;
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits.to_le_bytes());

        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf
    }

    #[test]
    fn parses_a_pcm_header() -> Result<()> {
        let mut buf = header(48000, 2, 16);
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = Cursor::new(buf);
        let fmt = read_header(&mut cursor)?;

        assert_eq!(fmt.sample_rate, 48000);
        assert_eq!(fmt.channels, 2);
        assert_eq!(fmt.bits_per_sample, 16);
        assert_eq!(fmt.data_len, 8);
        assert_eq!(cursor.position(), 44); // sitting on the sample data
        Ok(())
    }

    #[test]
    fn skips_unknown_chunks() -> Result<()> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");

        // a LIST chunk ahead of fmt
        buf.extend_from_slice(b"LIST");
        buf.extend_from_slice(&6u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 6]);

        let rest = header(44100, 2, 16);
        buf.extend_from_slice(&rest[12..]);

        let fmt = read_header(&mut Cursor::new(buf))?;
        assert_eq!(fmt.sample_rate, 44100);
        Ok(())
    }

    #[test]
    fn rejects_non_wave_input() {
        let mut cursor = Cursor::new(vec![0u8; 64]);
        assert!(read_header(&mut cursor).is_err());
    }

    #[test]
    fn rejects_compressed_formats() {
        let mut buf = header(44100, 2, 16);
        buf[20] = 3; // IEEE float format tag
        assert!(read_header(&mut Cursor::new(buf)).is_err());
    }
}
