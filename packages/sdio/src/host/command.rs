use embedded_hal::delay::DelayNs;

use super::codec::{CommandType, ResponseType, SdioRequest, SDIO_RESPONSE_LEN};
use super::session::{
    ios_status, SdioError, SdioHost, SdioResult, IOCTL_SDIO_SENDCMD, SDIO_CMD_READMULTIBLOCK,
    SDIO_CMD_WRITEMULTIBLOCK,
};
use crate::dma::{DmaAligned, DmaRegion};
use crate::ios::{CacheMaintenance, IoVec, IosService};

/// Caller memory moved by a data-bearing command.
#[derive(Debug)]
pub enum DataBuffer<'a> {
    /// Filled by the card.
    Read(&'a mut [u8]),
    /// Consumed by the card.
    Write(&'a [u8]),
}

impl DataBuffer<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Read(bytes) => bytes,
            Self::Write(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// One protocol command, built per call.
#[derive(Debug)]
pub struct SdioCommand<'a> {
    pub cmd: u8,
    pub cmd_type: CommandType,
    pub rsp_type: ResponseType,
    pub arg: u32,
    pub blk_cnt: u32,
    pub blk_size: u32,
    pub data: Option<DataBuffer<'a>>,
}

impl<'a> SdioCommand<'a> {
    pub const fn new(cmd: u8, cmd_type: CommandType, rsp_type: ResponseType, arg: u32) -> Self {
        Self {
            cmd,
            cmd_type,
            rsp_type,
            arg,
            blk_cnt: 0,
            blk_size: 0,
            data: None,
        }
    }

    pub fn with_data(mut self, blk_cnt: u32, blk_size: u32, data: DataBuffer<'a>) -> Self {
        self.blk_cnt = blk_cnt;
        self.blk_size = blk_size;
        self.data = Some(data);
        self
    }

    pub fn is_dma(&self) -> bool {
        self.data.is_some()
    }

    fn data_len(&self) -> SdioResult<usize> {
        let len = self
            .blk_cnt
            .checked_mul(self.blk_size)
            .ok_or(SdioError::InvalidArgument)? as usize;
        match &self.data {
            Some(data) if data.len() < len => Err(SdioError::InvalidArgument),
            _ => Ok(len),
        }
    }

    fn request(&self) -> SdioRequest {
        let dma_addr = self
            .data
            .as_ref()
            .map(|data| data.as_bytes().as_ptr() as usize as u32)
            .unwrap_or(0);
        SdioRequest {
            cmd: self.cmd as u32,
            cmd_type: self.cmd_type,
            rsp_type: self.rsp_type,
            arg: self.arg,
            blk_cnt: self.blk_cnt,
            blk_size: self.blk_size,
            dma_addr,
            is_dma: self.is_dma(),
        }
    }
}

impl<I, C, D> SdioHost<I, C, D>
where
    I: IosService,
    C: CacheMaintenance,
    D: DelayNs,
{
    /// Issue one command and return the raw service status.
    ///
    /// `reply` receives the leading bytes of the response descriptor when it fits.
    pub fn send_command(
        &mut self,
        mut command: SdioCommand<'_>,
        reply: Option<&mut [u8]>,
    ) -> SdioResult<i32> {
        let fd = self.require_fd()?;
        let data_len = command.data_len()?;
        let request = DmaAligned(command.request().encode());
        let mut response = DmaAligned([0u8; SDIO_RESPONSE_LEN]);
        let cmd = command.cmd;

        DmaRegion::of(&request.0).prepare_for_device(&mut self.cache);
        let data_region = command
            .data
            .as_ref()
            .map(|data| DmaRegion::of(&data.as_bytes()[..data_len]));
        if let Some(region) = &data_region {
            // A multi-block read never consumes buffer contents.
            if cmd != SDIO_CMD_READMULTIBLOCK {
                region.prepare_for_device(&mut self.cache);
            }
        }

        log::debug!(
            "sdio: cmd={} type={:?} arg={:#010x} blocks={}x{} dma={}",
            cmd,
            command.cmd_type,
            command.arg,
            command.blk_cnt,
            command.blk_size,
            command.is_dma()
        );

        let ret = if command.is_dma() || self.high_capacity {
            let data = match &mut command.data {
                Some(DataBuffer::Read(bytes)) => IoVec::Output(&mut bytes[..data_len]),
                Some(DataBuffer::Write(bytes)) => IoVec::Input(&bytes[..data_len]),
                None => IoVec::Null,
            };
            let mut vectors = [IoVec::Input(&request.0), data, IoVec::Output(&mut response.0)];
            self.ios.ioctlv(fd, IOCTL_SDIO_SENDCMD, 2, 1, &mut vectors)
        } else {
            // Some controller configurations reject vectored commands without DMA.
            self.ios
                .ioctl(fd, IOCTL_SDIO_SENDCMD, &request.0, &mut response.0)
        };

        if ret < 0 {
            log::warn!("sdio: cmd={} arg={:#010x} err={}", cmd, command.arg, ret);
            return ios_status(ret);
        }

        if let Some(region) = &data_region {
            // A multi-block write leaves nothing for the CPU to read back.
            if cmd != SDIO_CMD_WRITEMULTIBLOCK {
                region.prepare_for_host(&mut self.cache);
            }
        }

        if let Some(reply) = reply {
            if reply.len() <= SDIO_RESPONSE_LEN {
                DmaRegion::of(&response.0).prepare_for_host(&mut self.cache);
                reply.copy_from_slice(&response.0[..reply.len()]);
            }
        }

        Ok(ret)
    }
}
