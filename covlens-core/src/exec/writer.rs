use std::io::{self, Write};

use super::{
    BLOCK_EXECUTION_DATA, BLOCK_HEADER, BLOCK_SESSION_INFO, ExecutionData, FORMAT_VERSION,
    MAGIC_NUMBER, SessionInfo,
};
use crate::encoding::encode_modified_utf8;

/// Serialises sessions and execution data in the record format read by
/// [`super::ExecDataReader`]. The header block is written on construction.
#[derive(Debug)]
pub struct ExecDataWriter<W> {
    out: W,
}

impl<W: Write> ExecDataWriter<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        out.write_all(&[BLOCK_HEADER])?;
        out.write_all(&MAGIC_NUMBER.to_be_bytes())?;
        out.write_all(&FORMAT_VERSION.to_be_bytes())?;
        Ok(Self { out })
    }

    pub fn write_session_info(&mut self, session: &SessionInfo) -> io::Result<()> {
        self.out.write_all(&[BLOCK_SESSION_INFO])?;
        self.write_utf(&session.id)?;
        self.out.write_all(&session.start.to_be_bytes())?;
        self.out.write_all(&session.dump.to_be_bytes())
    }

    /// Write one class entry. Entries without any hit are still written.
    pub fn write_execution_data(&mut self, data: &ExecutionData) -> io::Result<()> {
        self.out.write_all(&[BLOCK_EXECUTION_DATA])?;
        self.out.write_all(&data.id.to_be_bytes())?;
        self.write_utf(&data.name)?;
        self.write_bool_array(&data.probes)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_utf(&mut self, s: &str) -> io::Result<()> {
        let bytes = encode_modified_utf8(s);
        let len = u16::try_from(bytes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long"))?;
        self.out.write_all(&len.to_be_bytes())?;
        self.out.write_all(&bytes)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_var_int(&mut self, mut value: u32) -> io::Result<()> {
        while value & 0xFFFF_FF80 != 0 {
            self.out.write_all(&[0x80 | (value & 0x7F) as u8])?;
            value >>= 7;
        }
        self.out.write_all(&[value as u8])
    }

    fn write_bool_array(&mut self, probes: &[bool]) -> io::Result<()> {
        let len = u32::try_from(probes.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many probes"))?;
        self.write_var_int(len)?;
        for chunk in probes.chunks(8) {
            let byte = chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (bit, &set)| if set { acc | (1 << bit) } else { acc });
            self.out.write_all(&[byte])?;
        }
        Ok(())
    }
}
