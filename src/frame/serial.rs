use super::*;

impl<'a> DataFrame<'a> {
    /// Decodes a data frame whose payload must be exactly `payload_size` bytes.
    pub fn read(bytes: &'a [u8], payload_size: usize) -> Result<Self, FrameError> {
        let expected = SEQ_SIZE + payload_size;

        if bytes.len() != expected {
            return Err(FrameError::Size {
                expected,
                actual: bytes.len(),
            });
        }

        let (seq_bytes, payload) = bytes.split_at(SEQ_SIZE);
        let seq = u32::from_ne_bytes([seq_bytes[0], seq_bytes[1], seq_bytes[2], seq_bytes[3]]);

        Ok(Self { seq, payload })
    }

    pub fn encoded_len(&self) -> usize {
        SEQ_SIZE + self.payload.len()
    }

    /// Writes the frame to the front of `buffer` and returns the number of bytes written, or
    /// `None` if the buffer is too small.
    pub fn write(&self, buffer: &mut [u8]) -> Option<usize> {
        let len = self.encoded_len();

        if buffer.len() < len {
            return None;
        }

        buffer[..SEQ_SIZE].copy_from_slice(&self.seq.to_ne_bytes());
        buffer[SEQ_SIZE..len].copy_from_slice(self.payload);

        Some(len)
    }

    pub fn write_boxed(&self) -> Box<[u8]> {
        let mut buffer = vec![0; self.encoded_len()].into_boxed_slice();
        self.write(&mut buffer);
        buffer
    }
}

impl AckFrame {
    pub fn new(cumulative_ack: i32) -> Self {
        Self { cumulative_ack }
    }

    pub fn read(bytes: &[u8]) -> Result<Self, FrameError> {
        match bytes {
            &[b0, b1, b2, b3] => Ok(Self {
                cumulative_ack: i32::from_ne_bytes([b0, b1, b2, b3]),
            }),
            _ => Err(FrameError::Size {
                expected: ACK_SIZE,
                actual: bytes.len(),
            }),
        }
    }

    pub fn write(&self) -> [u8; ACK_SIZE] {
        self.cumulative_ack.to_ne_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_layout() {
        let payload = [0xAA, 0xBB, 0xCC];
        let frame = DataFrame {
            seq: 7,
            payload: &payload,
        };

        let bytes = frame.write_boxed();

        assert_eq!(bytes.len(), 7);
        assert_eq!(&bytes[..4], &7u32.to_ne_bytes());
        assert_eq!(&bytes[4..], &payload);

        assert_eq!(DataFrame::read(&bytes, 3), Ok(frame));
    }

    #[test]
    fn data_frame_write_needs_room() {
        let payload = [0u8; 8];
        let frame = DataFrame {
            seq: 1,
            payload: &payload,
        };

        let mut small = [0u8; 11];
        assert_eq!(frame.write(&mut small), None);

        let mut exact = [0u8; 12];
        assert_eq!(frame.write(&mut exact), Some(12));

        let mut large = [0xFFu8; 16];
        assert_eq!(frame.write(&mut large), Some(12));
        assert_eq!(&large[12..], &[0xFF; 4]);
    }

    #[test]
    fn data_frame_wrong_size() {
        let bytes = [0u8; 10];

        assert_eq!(
            DataFrame::read(&bytes, 8),
            Err(FrameError::Size {
                expected: 12,
                actual: 10
            })
        );
        assert!(DataFrame::read(&bytes, 4).is_err());
        assert!(DataFrame::read(&bytes, 6).is_ok());
        assert!(DataFrame::read(&[], 0).is_err());
    }

    #[test]
    fn ack_frame() {
        for value in [ACK_NONE, 0, 1, 4095, i32::MAX] {
            let bytes = AckFrame::new(value).write();
            assert_eq!(bytes, value.to_ne_bytes());
            assert_eq!(AckFrame::read(&bytes), Ok(AckFrame::new(value)));
        }

        assert!(AckFrame::read(&[0, 0, 0]).is_err());
        assert!(AckFrame::read(&[0, 0, 0, 0, 0]).is_err());
    }
}
