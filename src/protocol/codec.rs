use super::{LabError, LabMessage, LabResult, TERMLAB_MAGIC};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are refused before the body is read.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const HEADER_LEN: usize = TERMLAB_MAGIC.len() + 4;

pub struct LabCodec;

impl LabCodec {
    pub fn encode(message: &LabMessage) -> LabResult<Vec<u8>> {
        let data = bincode::serialize(message)
            .map_err(|e| LabError::Protocol(format!("Serialization failed: {}", e)))?;

        if data.len() > MAX_FRAME_SIZE {
            return Err(LabError::Protocol("Message too large".to_string()));
        }

        let mut buffer = Vec::with_capacity(HEADER_LEN + data.len());
        buffer.extend_from_slice(TERMLAB_MAGIC);
        buffer.extend_from_slice(&(data.len() as u32).to_be_bytes());
        buffer.extend_from_slice(&data);

        Ok(buffer)
    }

    pub fn decode(data: &[u8]) -> LabResult<LabMessage> {
        if data.len() < HEADER_LEN {
            return Err(LabError::Protocol("Insufficient data".to_string()));
        }

        if &data[..TERMLAB_MAGIC.len()] != TERMLAB_MAGIC {
            return Err(LabError::Protocol("Invalid magic bytes".to_string()));
        }

        let length = frame_length(&data[TERMLAB_MAGIC.len()..HEADER_LEN]);
        if length > MAX_FRAME_SIZE {
            return Err(LabError::Protocol("Message too large".to_string()));
        }

        if data.len() < HEADER_LEN + length {
            return Err(LabError::Protocol("Incomplete message".to_string()));
        }

        bincode::deserialize(&data[HEADER_LEN..HEADER_LEN + length])
            .map_err(|e| LabError::Protocol(format!("Deserialization failed: {}", e)))
    }

    pub async fn read_message<R>(reader: &mut R) -> LabResult<LabMessage>
    where
        R: AsyncRead + Unpin,
    {
        let mut magic = [0u8; TERMLAB_MAGIC.len()];
        reader
            .read_exact(&mut magic)
            .await
            .map_err(|e| LabError::Network(format!("Failed to read magic: {}", e)))?;

        if magic != TERMLAB_MAGIC {
            return Err(LabError::Protocol("Invalid magic bytes".to_string()));
        }

        let mut length_bytes = [0u8; 4];
        reader
            .read_exact(&mut length_bytes)
            .await
            .map_err(|e| LabError::Network(format!("Failed to read length: {}", e)))?;

        let length = u32::from_be_bytes(length_bytes) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(LabError::Protocol("Message too large".to_string()));
        }

        let mut data = vec![0u8; length];
        reader
            .read_exact(&mut data)
            .await
            .map_err(|e| LabError::Network(format!("Failed to read data: {}", e)))?;

        bincode::deserialize(&data).map_err(|e| LabError::Protocol(format!("Deserialization failed: {}", e)))
    }

    pub async fn write_message<W>(writer: &mut W, message: &LabMessage) -> LabResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let encoded = Self::encode(message)?;
        writer
            .write_all(&encoded)
            .await
            .map_err(|e| LabError::Network(format!("Failed to write message: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| LabError::Network(format!("Failed to flush: {}", e)))?;
        Ok(())
    }
}

fn frame_length(bytes: &[u8]) -> usize {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
}

/// Reassembles frames from arbitrarily split reads.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    buffer: Vec<u8>,
    messages: Vec<LabMessage>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.try_parse_messages();
    }

    pub fn take_messages(&mut self) -> Vec<LabMessage> {
        std::mem::take(&mut self.messages)
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn try_parse_messages(&mut self) {
        while self.buffer.len() >= HEADER_LEN {
            if &self.buffer[..TERMLAB_MAGIC.len()] != TERMLAB_MAGIC {
                // Resync on the next byte.
                self.buffer.drain(0..1);
                continue;
            }

            let length = frame_length(&self.buffer[TERMLAB_MAGIC.len()..HEADER_LEN]);
            if length > MAX_FRAME_SIZE {
                self.buffer.drain(0..TERMLAB_MAGIC.len());
                continue;
            }

            let total_length = HEADER_LEN + length;
            if self.buffer.len() < total_length {
                break;
            }

            match LabCodec::decode(&self.buffer[..total_length]) {
                Ok(message) => {
                    self.messages.push(message);
                    self.buffer.drain(0..total_length);
                }
                Err(_) => {
                    self.buffer.drain(0..TERMLAB_MAGIC.len());
                }
            }
        }
    }
}
