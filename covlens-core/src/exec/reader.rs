use std::io::{ErrorKind, Read};

use super::{
    BLOCK_EXECUTION_DATA, BLOCK_HEADER, BLOCK_SESSION_INFO, ExecutionData, ExecutionStore,
    FORMAT_VERSION, MAGIC_NUMBER, SessionInfo,
};
use crate::encoding::decode_modified_utf8;
use crate::error::RecordLoadError;

/// Streaming decoder for execution-record blocks.
#[derive(Debug)]
pub struct ExecDataReader<R> {
    input: R,
    first_block: bool,
}

impl<R: Read> ExecDataReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            first_block: true,
        }
    }

    /// Read every block until end of input, merging into `store`.
    ///
    /// End of input is only valid on a block boundary. An empty stream yields
    /// an empty store.
    pub fn read_into(&mut self, store: &mut ExecutionStore) -> Result<(), RecordLoadError> {
        while let Some(block) = self.next_block_type()? {
            if self.first_block && block != BLOCK_HEADER {
                return Err(RecordLoadError::InvalidHeader);
            }
            self.first_block = false;
            match block {
                BLOCK_HEADER => self.read_header()?,
                BLOCK_SESSION_INFO => {
                    let session = self.read_session_info()?;
                    store.add_session(session);
                }
                BLOCK_EXECUTION_DATA => {
                    let data = self.read_execution_data()?;
                    store.put(data)?;
                }
                other => return Err(RecordLoadError::UnknownBlock(other)),
            }
        }
        Ok(())
    }

    fn next_block_type(&mut self) -> Result<Option<u8>, RecordLoadError> {
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => return Err(RecordLoadError::Truncated),
            }
        }
    }

    fn read_header(&mut self) -> Result<(), RecordLoadError> {
        if self.read_u16()? != MAGIC_NUMBER {
            return Err(RecordLoadError::InvalidHeader);
        }
        let version = self.read_u16()?;
        if version != FORMAT_VERSION {
            return Err(RecordLoadError::IncompatibleVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(())
    }

    fn read_session_info(&mut self) -> Result<SessionInfo, RecordLoadError> {
        let id = self.read_utf()?;
        let start = self.read_i64()?;
        let dump = self.read_i64()?;
        Ok(SessionInfo { id, start, dump })
    }

    fn read_execution_data(&mut self) -> Result<ExecutionData, RecordLoadError> {
        let id = self.read_i64()?;
        let name = self.read_utf()?;
        let probes = self.read_bool_array()?;
        Ok(ExecutionData { id, name, probes })
    }

    // ── Primitives ─────────────────────────────────────────────────

    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N], RecordLoadError> {
        let mut buf = [0u8; N];
        self.input
            .read_exact(&mut buf)
            .map_err(|_| RecordLoadError::Truncated)?;
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8, RecordLoadError> {
        Ok(self.read_exact::<1>()?[0])
    }

    fn read_u16(&mut self) -> Result<u16, RecordLoadError> {
        Ok(u16::from_be_bytes(self.read_exact()?))
    }

    fn read_i64(&mut self) -> Result<i64, RecordLoadError> {
        Ok(i64::from_be_bytes(self.read_exact()?))
    }

    fn read_utf(&mut self) -> Result<String, RecordLoadError> {
        let len = usize::from(self.read_u16()?);
        let mut bytes = vec![0u8; len];
        self.input
            .read_exact(&mut bytes)
            .map_err(|_| RecordLoadError::Truncated)?;
        decode_modified_utf8(&bytes).ok_or(RecordLoadError::MalformedString)
    }

    /// Variable-length int: 7 bits per byte, low group first, high bit continues.
    fn read_var_int(&mut self) -> Result<u32, RecordLoadError> {
        let mut value: u32 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            if shift >= 32 {
                return Err(RecordLoadError::Truncated);
            }
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn read_bool_array(&mut self) -> Result<Vec<bool>, RecordLoadError> {
        let len = self.read_var_int()? as usize;
        let mut probes = Vec::with_capacity(len.min(1 << 16));
        let mut buffer = 0u8;
        for i in 0..len {
            if i % 8 == 0 {
                buffer = self.read_u8()?;
            }
            probes.push(buffer & 0x01 != 0);
            buffer >>= 1;
        }
        Ok(probes)
    }
}
