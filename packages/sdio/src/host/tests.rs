use super::{
    CommandType, DataBuffer, ResponseType, SdioCommand, SdioConfig, SdioError, SdioHost,
    IOCTL_SDIO_GETSTATUS, IOCTL_SDIO_READHCREG, IOCTL_SDIO_SENDCMD, IOCTL_SDIO_SETCLK,
    IOCTL_SDIO_WRITEHCREG, SDIOHCR_HOSTCONTROL, SDIOHCR_SOFTWARERESET, SDIO_ACMD_SETBUSWIDTH,
    SDIO_CMD_APPCMD, SDIO_CMD_READBLOCK, SDIO_CMD_READMULTIBLOCK, SDIO_CMD_SELECT,
    SDIO_CMD_SETBLOCKLEN, SDIO_CMD_WRITEMULTIBLOCK,
};
use crate::dma::DmaAligned;
use crate::ios::{IosOpenMode, IPC_EINVAL, IPC_ENOENT};
use crate::lifecycle::CardPhase;
use crate::sim::{SimCache, SimCall, SimDelay, SimIos};

type SimHost = SdioHost<SimIos, SimCache, SimDelay>;

const STATUS_INSERTED: u32 = 0x00_0001;
const STATUS_READY: u32 = 0x01_0001;
const STATUS_READY_SDHC: u32 = 0x11_0001;

fn host_with(ios: SimIos) -> SimHost {
    SdioHost::new(
        ios,
        SimCache::default(),
        SimDelay::default(),
        SdioConfig::default(),
    )
}

fn opened(status: u32) -> SimHost {
    let mut host = host_with(SimIos::new(status, 256));
    host.open().unwrap();
    host
}

fn ready(status: u32) -> SimHost {
    let mut host = opened(status);
    host.init_io().unwrap();
    host.ios_mut().clear_log();
    host
}

fn hcr_reads(host: &SimHost) -> usize {
    host.ios()
        .calls()
        .iter()
        .filter(|call| {
            **call
                == SimCall::Ioctl {
                    op: IOCTL_SDIO_READHCREG,
                }
        })
        .count()
}

fn cmd_args(host: &SimHost) -> Vec<(u32, u32)> {
    host.ios()
        .commands()
        .iter()
        .map(|request| (request.cmd, request.arg))
        .collect()
}

#[test]
fn open_uses_configured_path_once() {
    let mut host = host_with(SimIos::new(STATUS_READY, 1));
    host.open().unwrap();
    host.open().unwrap();
    assert_eq!(
        host.ios().calls(),
        &[SimCall::Open {
            path: "/dev/sdio/slot0".into(),
            mode: IosOpenMode::None,
        }]
    );
    assert_eq!(host.phase(), CardPhase::Opened);
}

#[test]
fn open_failure_is_reported_with_service_code() {
    let mut host = host_with(SimIos::new(STATUS_READY, 1).with_path("/dev/sdio/slot1"));
    assert_eq!(host.open(), Err(SdioError::Ios(IPC_ENOENT)));
    assert!(!host.is_open());
    assert_eq!(host.phase(), CardPhase::Closed);
}

#[test]
fn calls_before_open_never_reach_the_service() {
    let mut host = host_with(SimIos::new(STATUS_READY, 1));
    assert_eq!(host.read_hcr(SDIOHCR_HOSTCONTROL, 1), Err(SdioError::NotOpen));
    assert_eq!(host.status(), Err(SdioError::NotOpen));
    assert_eq!(
        host.send_command(
            SdioCommand::new(SDIO_CMD_SELECT, CommandType::Ac, ResponseType::R1b, 0),
            None
        ),
        Err(SdioError::NotOpen)
    );
    assert!(host.ios().calls().is_empty());
}

#[test]
fn register_write_then_read_round_trips() {
    let mut host = opened(STATUS_READY);
    host.write_hcr(SDIOHCR_HOSTCONTROL, 1, 0x02).unwrap();
    assert_eq!(host.read_hcr(SDIOHCR_HOSTCONTROL, 1), Ok(0x02));
    host.write_hcr(0x2C, 2, 0x0107).unwrap();
    assert_eq!(host.read_hcr(0x2C, 2), Ok(0x0107));
}

#[test]
fn register_read_invalidates_value_after_call() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().set_register(SDIOHCR_HOSTCONTROL, 0x11);
    assert_eq!(host.read_hcr(SDIOHCR_HOSTCONTROL, 1), Ok(0x11));
    let ops = host.cache().ops();
    assert_eq!(ops.len(), 2);
    assert!(matches!(ops[0], crate::sim::CacheOp::Flush { len: 24, .. }));
    assert!(matches!(ops[1], crate::sim::CacheOp::Invalidate { len: 4, .. }));
}

#[test]
fn unsupported_register_width_is_rejected_locally() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().clear_log();
    assert_eq!(
        host.read_hcr(SDIOHCR_HOSTCONTROL, 3),
        Err(SdioError::InvalidArgument)
    );
    assert_eq!(
        host.write_hcr(SDIOHCR_HOSTCONTROL, 0, 1),
        Err(SdioError::InvalidArgument)
    );
    assert!(host.ios().calls().is_empty());
}

#[test]
fn wait_times_out_after_ten_spaced_polls() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().set_register(SDIOHCR_SOFTWARERESET, 0x07);
    assert_eq!(
        host.wait_hcr(SDIOHCR_SOFTWARERESET, 1, super::BitsState::Clear, 0x07),
        Err(SdioError::Timeout)
    );
    assert_eq!(hcr_reads(&host), 10);
    assert_eq!(host.delay().ms_waits(), &[10; 10]);
}

#[test]
fn wait_returns_on_first_matching_poll() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().set_register(SDIOHCR_HOSTCONTROL, 0x02);
    assert_eq!(
        host.wait_hcr(SDIOHCR_HOSTCONTROL, 1, super::BitsState::Set, 0x02),
        Ok(())
    );
    assert_eq!(hcr_reads(&host), 1);
    assert!(host.delay().ms_waits().is_empty());
}

#[test]
fn wait_follows_register_until_bits_clear() {
    let mut host = host_with(SimIos::new(STATUS_READY, 1).with_reset_polls(3));
    host.open().unwrap();
    host.write_hcr(SDIOHCR_SOFTWARERESET, 1, 0x07).unwrap();
    assert_eq!(
        host.wait_hcr(SDIOHCR_SOFTWARERESET, 1, super::BitsState::Clear, 0x07),
        Ok(())
    );
    assert_eq!(hcr_reads(&host), 4);
    assert_eq!(host.delay().ms_waits(), &[10, 10, 10]);
}

#[test]
fn reset_card_latches_relative_address() {
    let mut host = host_with(SimIos::new(STATUS_READY, 1).with_rca(0xB368));
    host.open().unwrap();
    assert_eq!(host.reset_card(), Ok(0));
    assert_eq!(host.rca(), 0xB368);
    assert_eq!(host.phase(), CardPhase::Reset);
}

#[test]
fn uninitialized_controller_is_reset_and_reopened() {
    let mut host = opened(STATUS_INSERTED);
    assert_eq!(host.init_io(), Err(SdioError::ControllerReset));

    let calls = host.ios().calls();
    assert!(calls.contains(&SimCall::Ioctl {
        op: IOCTL_SDIO_WRITEHCREG
    }));
    assert!(calls.contains(&SimCall::Ioctl {
        op: IOCTL_SDIO_READHCREG
    }));
    assert!(!calls.contains(&SimCall::Ioctl {
        op: IOCTL_SDIO_SETCLK
    }));
    assert!(host.ios().commands().is_empty());
    assert_eq!(host.ios().register(SDIOHCR_HOSTCONTROL), None);

    let reopen = &calls[calls.len() - 2..];
    assert!(matches!(reopen[0], SimCall::Close { .. }));
    assert_eq!(
        reopen[1],
        SimCall::Open {
            path: "/dev/sdio/slot0".into(),
            mode: IosOpenMode::Read,
        }
    );
    assert!(host.is_open());
    assert!(!host.is_card_initialized());
    assert_eq!(host.phase(), CardPhase::Opened);
}

#[test]
fn controller_ready_after_reset_brings_up_on_next_attempt() {
    let mut host = host_with(SimIos::new(STATUS_INSERTED, 1).initialize_after_reset(true));
    host.open().unwrap();
    assert_eq!(host.init_io(), Err(SdioError::ControllerReset));
    assert_eq!(host.init_io(), Ok(()));
    assert_eq!(host.phase(), CardPhase::Ready);
}

#[test]
fn high_capacity_card_is_brought_up() {
    let mut host = opened(STATUS_READY_SDHC);
    assert_eq!(host.init_io(), Ok(()));

    assert!(host.is_high_capacity());
    assert!(host.is_card_initialized());
    assert_eq!(host.phase(), CardPhase::Ready);
    assert_eq!(host.ios().register(SDIOHCR_HOSTCONTROL), Some(0x02));
    assert!(host.ios().clock_enabled());
    assert_eq!(host.ios().card_bus_width(), 4);
    assert_eq!(host.ios().card_block_len(), 512);
    assert!(!host.ios().card_selected());
    assert_eq!(
        cmd_args(&host),
        vec![
            (SDIO_CMD_SELECT as u32, 0x0001_0000),
            (SDIO_CMD_SETBLOCKLEN as u32, 512),
            (SDIO_CMD_APPCMD as u32, 0x0001_0000),
            (SDIO_ACMD_SETBUSWIDTH as u32, 0x2),
            (SDIO_CMD_SELECT as u32, 0),
        ]
    );
}

#[test]
fn host_bus_width_preserves_other_control_bits() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().set_register(SDIOHCR_HOSTCONTROL, 0x05);
    host.set_host_bus_width(4).unwrap();
    assert_eq!(host.ios().register(SDIOHCR_HOSTCONTROL), Some(0x07));
    host.set_host_bus_width(1).unwrap();
    assert_eq!(host.ios().register(SDIOHCR_HOSTCONTROL), Some(0x05));
}

#[test]
fn absent_card_fails_without_commands() {
    let mut host = opened(0);
    assert_eq!(host.init_io(), Err(SdioError::NotInserted));
    assert!(host.ios().commands().is_empty());
    assert_eq!(host.phase(), CardPhase::NotInserted);
}

#[test]
fn status_failure_aborts_bring_up() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().fail_ioctl(IOCTL_SDIO_GETSTATUS, IPC_ENOENT);
    assert_eq!(host.init_io(), Err(SdioError::Ios(IPC_ENOENT)));
    assert_eq!(host.phase(), CardPhase::Failed);
}

#[test]
fn block_length_failure_still_deselects() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().fail_command(SDIO_CMD_SETBLOCKLEN, IPC_EINVAL);
    assert_eq!(host.init_io(), Err(SdioError::Ios(IPC_EINVAL)));
    assert_eq!(host.ios().command_count(SDIO_CMD_SELECT), 2);
    assert_eq!(host.ios().command_count(SDIO_CMD_APPCMD), 0);
    assert!(!host.ios().card_selected());
    assert!(!host.is_card_initialized());
    assert_eq!(host.phase(), CardPhase::Failed);
}

#[test]
fn bus_width_failure_still_deselects() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().fail_command(SDIO_CMD_APPCMD, IPC_EINVAL);
    assert_eq!(host.init_io(), Err(SdioError::Ios(IPC_EINVAL)));
    assert_eq!(
        cmd_args(&host).last(),
        Some(&(SDIO_CMD_SELECT as u32, 0))
    );
    assert!(!host.ios().card_selected());
}

#[test]
fn select_failure_skips_deselect() {
    let mut host = opened(STATUS_READY);
    host.ios_mut().fail_command(SDIO_CMD_SELECT, IPC_EINVAL);
    assert!(host.init_io().is_err());
    assert_eq!(host.ios().command_count(SDIO_CMD_SELECT), 1);
    assert_eq!(host.ios().command_count(SDIO_CMD_SETBLOCKLEN), 0);
}

#[test]
fn plain_command_on_standard_card_uses_ioctl() {
    let mut host = ready(STATUS_READY);
    host.select().unwrap();
    assert_eq!(
        host.ios().calls(),
        &[SimCall::Ioctl {
            op: IOCTL_SDIO_SENDCMD
        }]
    );
}

#[test]
fn plain_command_on_high_capacity_card_uses_ioctlv() {
    let mut host = ready(STATUS_READY_SDHC);
    host.select().unwrap();
    assert_eq!(
        host.ios().calls(),
        &[SimCall::Ioctlv {
            op: IOCTL_SDIO_SENDCMD,
            num_in: 2,
            num_io: 1,
        }]
    );
}

#[test]
fn multi_block_read_skips_flush_of_data_buffer() {
    let mut host = ready(STATUS_READY_SDHC);
    for (i, byte) in host.ios_mut().storage_mut()[1024..2048].iter_mut().enumerate() {
        *byte = i as u8;
    }
    host.select().unwrap();
    host.cache.clear();

    let mut buffer = DmaAligned([0u8; 1024]);
    let addr = buffer.0.as_ptr() as usize;
    let command = SdioCommand::new(
        SDIO_CMD_READMULTIBLOCK,
        CommandType::Ac,
        ResponseType::R1,
        2,
    )
    .with_data(2, 512, DataBuffer::Read(&mut buffer.0));
    host.send_command(command, None).unwrap();

    assert!(!host.cache().flushed(addr));
    assert!(host.cache().invalidated(addr));
    assert_eq!(buffer.0[0], 0);
    assert_eq!(buffer.0[513], 1);
    let request = host.ios().commands().last().copied().unwrap();
    assert_eq!(request.dma_addr, addr as u32);
    assert!(request.is_dma);
}

#[test]
fn multi_block_write_skips_invalidate_of_data_buffer() {
    let mut host = ready(STATUS_READY);
    host.select().unwrap();
    host.cache.clear();

    let buffer = DmaAligned([0xA5u8; 512]);
    let addr = buffer.0.as_ptr() as usize;
    let command = SdioCommand::new(
        SDIO_CMD_WRITEMULTIBLOCK,
        CommandType::Ac,
        ResponseType::R1,
        512 * 3,
    )
    .with_data(1, 512, DataBuffer::Write(&buffer.0));
    host.send_command(command, None).unwrap();

    assert!(host.cache().flushed(addr));
    assert!(!host.cache().invalidated(addr));
    assert!(host.ios().sector(3).iter().all(|byte| *byte == 0xA5));
    assert!(host.ios().sector(2).iter().all(|byte| *byte == 0));
}

#[test]
fn data_segment_direction_follows_transfer_with_fixed_counts() {
    let mut host = ready(STATUS_READY);
    host.select().unwrap();
    host.ios_mut().clear_log();

    let source = DmaAligned([0x3Cu8; 512]);
    let write = SdioCommand::new(SDIO_CMD_WRITEMULTIBLOCK, CommandType::Ac, ResponseType::R1, 512)
        .with_data(1, 512, DataBuffer::Write(&source.0));
    host.send_command(write, None).unwrap();

    let mut target = DmaAligned([0u8; 512]);
    let read = SdioCommand::new(SDIO_CMD_READBLOCK, CommandType::Ac, ResponseType::R1, 512)
        .with_data(1, 512, DataBuffer::Read(&mut target.0));
    host.send_command(read, None).unwrap();

    assert!(target.0.iter().all(|byte| *byte == 0x3C));
    let sendcmd = SimCall::Ioctlv {
        op: IOCTL_SDIO_SENDCMD,
        num_in: 2,
        num_io: 1,
    };
    assert_eq!(host.ios().calls(), &[sendcmd.clone(), sendcmd]);
}

#[test]
fn single_block_read_flushes_and_invalidates() {
    let mut host = ready(STATUS_READY);
    host.select().unwrap();
    host.cache.clear();

    let mut buffer = DmaAligned([0u8; 512]);
    let addr = buffer.0.as_ptr() as usize;
    let command = SdioCommand::new(SDIO_CMD_READBLOCK, CommandType::Ac, ResponseType::R1, 0)
        .with_data(1, 512, DataBuffer::Read(&mut buffer.0));
    host.send_command(command, None).unwrap();

    assert!(host.cache().flushed(addr));
    assert!(host.cache().invalidated(addr));
}

#[test]
fn short_data_buffer_is_rejected_before_call() {
    let mut host = ready(STATUS_READY);
    let mut buffer = DmaAligned([0u8; 512]);
    let command = SdioCommand::new(
        SDIO_CMD_READMULTIBLOCK,
        CommandType::Ac,
        ResponseType::R1,
        0,
    )
    .with_data(4, 512, DataBuffer::Read(&mut buffer.0));
    assert_eq!(
        host.send_command(command, None),
        Err(SdioError::InvalidArgument)
    );
    assert!(host.ios().calls().is_empty());
}

#[test]
fn reply_receives_card_status_word() {
    let mut host = ready(STATUS_READY);
    assert_eq!(host.send_status(), Ok(3 << 9));
    host.select().unwrap();
    assert_eq!(host.send_status(), Ok(4 << 9));
}

#[test]
fn oversized_reply_is_left_untouched() {
    let mut host = ready(STATUS_READY);
    let mut reply = [0xEEu8; 20];
    host.send_command(
        SdioCommand::new(SDIO_CMD_SELECT, CommandType::Ac, ResponseType::R1b, 0x0001_0000),
        Some(&mut reply),
    )
    .unwrap();
    assert!(reply.iter().all(|byte| *byte == 0xEE));
}

#[test]
fn failed_command_surfaces_service_code() {
    let mut host = ready(STATUS_READY);
    host.ios_mut().fail_command(SDIO_CMD_SELECT, -1);
    assert_eq!(host.select(), Err(SdioError::Ios(-1)));
}

#[test]
fn sector_address_depends_on_capacity_class() {
    let mut host = ready(STATUS_READY);
    assert_eq!(host.sector_address(100), Ok(51_200));
    assert_eq!(host.sector_address(0), Ok(0));
    assert_eq!(
        host.sector_address(0x0080_0000),
        Err(SdioError::InvalidArgument)
    );
    host.high_capacity = true;
    assert_eq!(host.sector_address(100), Ok(100));
    assert_eq!(host.sector_address(u32::MAX), Ok(u32::MAX));
}

#[test]
fn close_drops_card_state() {
    let mut host = ready(STATUS_READY_SDHC);
    host.close().unwrap();
    assert!(!host.is_open());
    assert_eq!(host.rca(), 0);
    assert!(!host.is_high_capacity());
    assert!(!host.is_card_initialized());
    assert_eq!(host.phase(), CardPhase::Closed);

    host.ios_mut().clear_log();
    host.close().unwrap();
    assert!(host.ios().calls().is_empty());
}

#[test]
fn error_codes_follow_service_convention() {
    assert_eq!(SdioError::Ios(-6).code(), -6);
    assert_eq!(SdioError::Misaligned.code(), IPC_EINVAL);
    assert_eq!(SdioError::NotOpen.code(), IPC_ENOENT);
    assert!(SdioError::Timeout.code() < 0);
}
