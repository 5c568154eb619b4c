use radio802154::{
    coex::CoexDecision,
    config::{DriverConfig, ExtAddress, Iid},
    driver::{RadioState, CCA_THRESHOLD_ALWAYS_BUSY},
    frame::{TxFrame, TxInfo},
    radio::{HardwareEvents, SchedulerStatus},
    security::ccm_nonce,
    RadioDriver, RadioError, TxError,
};

use mock::{
    ack_frame, data_frame, key, secured_frame, setup, tx_frame, Call, MockCoex, MockRadio,
    RecordingMac, CHANNEL, MIC_FILL,
};

#[test]
fn test_transmit_without_ack() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    driver.receive(Iid::PRIMARY, CHANNEL).unwrap();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(7, false)))
        .unwrap();
    assert_eq!(driver.state(), RadioState::Transmit);
    assert_eq!(radio.last_tx(), Some(data_frame(7, false)));
    assert_eq!(
        radio.count(|call| matches!(call, Call::StartCsmaTx { channel: CHANNEL, .. })),
        1
    );

    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);
    assert_eq!(driver.state(), RadioState::Receive);
    assert_eq!(radio.count(|call| *call == Call::YieldRadio), 1);

    driver.process(&mut mac);
    assert_eq!(mac.transmitted.len(), 1);
    let (iid, frame, ack, status) = &mac.transmitted[0];
    assert_eq!(*iid, Iid::PRIMARY);
    assert_eq!(frame.sequence(), Some(7));
    assert!(ack.is_none());
    assert_eq!(*status, Ok(()));

    // Delivered exactly once
    driver.process(&mut mac);
    assert_eq!(mac.transmitted.len(), 1);
}

#[test]
fn test_transmit_with_ack() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(9, true)))
        .unwrap();
    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);

    // Waiting for the ACK, nothing to deliver yet
    driver.process(&mut mac);
    assert!(mac.transmitted.is_empty());

    radio.push_rx(&ack_frame(9, true), 0);
    driver.on_hardware_event(HardwareEvents::RX_PACKET_RECEIVED);
    driver.process(&mut mac);

    assert_eq!(mac.transmitted.len(), 1);
    let (_, _, ack, status) = &mac.transmitted[0];
    assert_eq!(*status, Ok(()));
    let ack = ack.as_ref().unwrap();
    assert_eq!(ack.sequence(), Some(9));
    assert!(ack.frame_pending());
    assert_eq!(ack.rssi, -50);
    // ACKs are never queued as received frames
    assert!(mac.received.is_empty());
}

#[test]
fn test_transmit_no_ack() {
    let (driver, _, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(3, true)))
        .unwrap();
    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);
    driver.on_hardware_event(HardwareEvents::RX_ACK_TIMEOUT);
    driver.process(&mut mac);

    assert_eq!(mac.last_status(), Some(Err(TxError::NoAck)));
    assert!(mac.transmitted[0].2.is_none());
}

#[test]
fn test_ack_with_other_sequence_is_ignored() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(20, true)))
        .unwrap();
    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);

    radio.push_rx(&ack_frame(21, false), 0);
    driver.on_hardware_event(HardwareEvents::RX_PACKET_RECEIVED);
    driver.process(&mut mac);
    assert!(mac.transmitted.is_empty());

    radio.push_rx(&ack_frame(20, false), 0);
    driver.on_hardware_event(HardwareEvents::RX_PACKET_RECEIVED);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Ok(())));
}

#[test]
fn test_ack_without_transmit_is_ignored() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    radio.push_rx(&ack_frame(1, false), 0);
    driver.on_hardware_event(HardwareEvents::RX_PACKET_RECEIVED);
    driver.process(&mut mac);
    assert!(mac.transmitted.is_empty());
    assert!(mac.received.is_empty());
}

#[test]
fn test_channel_busy() {
    let (driver, _, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, true)))
        .unwrap();
    driver.on_hardware_event(HardwareEvents::TX_CHANNEL_BUSY);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Err(TxError::ChannelAccessFailure)));
}

#[test]
fn test_underflow_aborts() {
    let (driver, _, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    driver.on_hardware_event(HardwareEvents::TX_UNDERFLOW);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Err(TxError::Abort)));
}

#[test]
fn test_second_transmit_is_busy() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    assert_eq!(
        driver.transmit(Iid::PRIMARY, tx_frame(&data_frame(2, false))),
        Err(RadioError::Busy)
    );
    assert_eq!(radio.count(|call| matches!(call, Call::WriteTxFifo(_))), 1);

    // The slot stays taken until the result is delivered
    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);
    assert_eq!(
        driver.transmit(Iid::PRIMARY, tx_frame(&data_frame(2, false))),
        Err(RadioError::Busy)
    );
    driver.process(&mut mac);
    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(2, false)))
        .unwrap();
}

#[test]
fn test_transmit_before_init() {
    let driver: RadioDriver<MockRadio, MockCoex> =
        RadioDriver::new(MockRadio::new(), MockCoex::new(), DriverConfig::single_pan());
    assert_eq!(
        driver.transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false))),
        Err(RadioError::InvalidState)
    );
}

#[test]
fn test_transmit_argument_checks() {
    let (driver, _, _) = setup(DriverConfig::single_pan());
    assert_eq!(
        driver.transmit(Iid::PRIMARY, TxFrame::new(27, &data_frame(1, false)).unwrap()),
        Err(RadioError::InvalidArgs)
    );
    assert_eq!(
        driver.transmit(Iid::BROADCAST, tx_frame(&data_frame(1, false))),
        Err(RadioError::InvalidArgs)
    );
    assert_eq!(TxFrame::new(CHANNEL, &[0x41, 0x88]), Err(RadioError::InvalidArgs));
    assert_eq!(TxFrame::new(CHANNEL, &[0u8; 128]), Err(RadioError::InvalidArgs));
}

#[test]
fn test_direct_transmit_skips_csma() {
    let (driver, radio, _) = setup(DriverConfig::single_pan().with_tx_power(4));
    let frame = tx_frame(&data_frame(1, true)).with_info(TxInfo {
        csma_ca_enabled: false,
        ..TxInfo::default()
    });
    driver.transmit(Iid::PRIMARY, frame).unwrap();

    let start = radio
        .calls()
        .into_iter()
        .find(|call| matches!(call, Call::StartTx { .. }))
        .unwrap();
    let Call::StartTx { channel, options } = start else {
        unreachable!()
    };
    assert_eq!(channel, CHANNEL);
    assert!(options.wait_for_ack);
    assert_eq!(options.tx_power_dbm, 4);
}

#[test]
fn test_csma_parameters_follow_frame() {
    let (driver, radio, _) = setup(DriverConfig::single_pan().with_cca_threshold(-70));
    let frame = tx_frame(&data_frame(1, false)).with_info(TxInfo {
        max_csma_backoffs: 2,
        tx_power: Some(-3),
        ..TxInfo::default()
    });
    driver.transmit(Iid::PRIMARY, frame).unwrap();

    let Some(Call::StartCsmaTx { csma, options, .. }) = radio
        .calls()
        .into_iter()
        .find(|call| matches!(call, Call::StartCsmaTx { .. }))
    else {
        panic!("no csma transmit started");
    };
    assert_eq!(csma.max_tries, 2);
    assert_eq!(csma.min_be, 3);
    assert_eq!(csma.max_be, 5);
    assert_eq!(csma.backoff_us, 320);
    assert_eq!(csma.cca_duration_us, 128);
    assert_eq!(csma.cca_threshold_dbm, -70);
    assert_eq!(options.tx_power_dbm, -3);
}

#[test]
fn test_scheduled_transmit() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let frame = tx_frame(&data_frame(1, false)).with_info(TxInfo {
        tx_delay_base_time: 10_000,
        tx_delay: 5_000,
        ..TxInfo::default()
    });
    driver.transmit(Iid::PRIMARY, frame).unwrap();

    let Some(Call::StartScheduledTx { schedule, csma, .. }) = radio
        .calls()
        .into_iter()
        .find(|call| matches!(call, Call::StartScheduledTx { .. }))
    else {
        panic!("no scheduled transmit started");
    };
    assert_eq!(schedule.when_us, 15_000 - 160);
    assert!(schedule.postpone_during_rx);
    assert_eq!(csma.max_tries, 1);
    assert_eq!(csma.min_be, 0);
}

#[test]
fn test_start_failure_aborts() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    radio.with(|state| state.fail_start_tx = true);

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Err(TxError::Abort)));
}

#[test]
fn test_secured_transmit_uses_frame_counter() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    let ext = ExtAddress::new([0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17]);
    driver.set_extended_address(Iid::PRIMARY, ext).unwrap();
    driver
        .set_mac_keys(Iid::PRIMARY, 2, key(1), key(2), key(3))
        .unwrap();
    driver.set_mac_frame_counter(Iid::PRIMARY, 100, false).unwrap();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&secured_frame(5)))
        .unwrap();
    let sent = radio.last_tx().unwrap();
    assert_eq!(&sent[10..14], &100u32.to_le_bytes());
    assert_eq!(sent[14], 2);
    assert_eq!(&sent[17..21], &[MIC_FILL; 4]);
    assert!(radio.calls().contains(&Call::SecureFrame {
        header_len: 15,
        mic_len: 4,
        nonce: ccm_nonce(&ext, 100, 5),
    }));
    assert_eq!(driver.mac_frame_counter(Iid::PRIMARY), Ok(101));

    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);
    driver.on_hardware_event(HardwareEvents::RX_ACK_TIMEOUT);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Err(TxError::NoAck)));

    // A retransmission keeps the counter of the first attempt
    let mut retry = driver.transmit_buffer(Iid::PRIMARY).unwrap();
    assert!(retry.info.is_security_processed);
    retry.info.is_retransmission = true;
    retry.info.is_security_processed = false;
    driver.transmit(Iid::PRIMARY, retry).unwrap();
    let resent = radio.last_tx().unwrap();
    assert_eq!(&resent[10..14], &100u32.to_le_bytes());
    assert_eq!(driver.mac_frame_counter(Iid::PRIMARY), Ok(101));
}

#[test]
fn test_secured_transmit_without_keys_aborts() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&secured_frame(5)))
        .unwrap();
    assert!(radio.last_tx().is_none());
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Err(TxError::Abort)));
}

#[test]
fn test_frame_counter_only_raised_when_asked() {
    let (driver, _, _) = setup(DriverConfig::single_pan());
    driver.set_mac_frame_counter(Iid::PRIMARY, 50, false).unwrap();
    driver.set_mac_frame_counter(Iid::PRIMARY, 40, true).unwrap();
    assert_eq!(driver.mac_frame_counter(Iid::PRIMARY), Ok(50));
    driver.set_mac_frame_counter(Iid::PRIMARY, 60, true).unwrap();
    assert_eq!(driver.mac_frame_counter(Iid::PRIMARY), Ok(60));
    assert_eq!(
        driver.set_mac_keys(Iid::PRIMARY, 0, key(1), key(2), key(3)),
        Err(RadioError::InvalidArgs)
    );
}

#[test]
fn test_coex_denied() {
    let (driver, radio, coex) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    driver.set_coex_enabled(true);
    coex.push_decision(CoexDecision::Denied);

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    assert_eq!(radio.count(|call| matches!(call, Call::WriteTxFifo(_))), 0);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Err(TxError::ChannelAccessFailure)));
    assert_eq!(coex.with(|state| state.finished), 1);
}

#[test]
fn test_coex_deferred_then_granted() {
    let (driver, radio, coex) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    driver.set_coex_enabled(true);
    coex.push_decision(CoexDecision::Deferred);

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    assert!(radio.last_tx().is_none());
    driver.process(&mut mac);
    assert!(mac.transmitted.is_empty());

    driver.coex_granted(true);
    assert!(radio.last_tx().is_some());
    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Ok(())));
}

#[test]
fn test_coex_grant_watchdog() {
    let (driver, radio, coex) = setup(
        DriverConfig::single_pan().with_coex_grant_timeout(Some(1_000)),
    );
    let mut mac = RecordingMac::new();
    driver.set_coex_enabled(true);
    coex.push_decision(CoexDecision::Deferred);
    radio.with(|state| state.now_us = 5_000);

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    radio.with(|state| state.now_us = 5_500);
    driver.process(&mut mac);
    assert!(mac.transmitted.is_empty());

    radio.with(|state| state.now_us = 6_000);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Err(TxError::ChannelAccessFailure)));

    // A late grant has no effect
    driver.coex_granted(true);
    assert!(radio.last_tx().is_none());
}

#[test]
fn test_coex_hold_off_forces_busy_channel() {
    let (driver, radio, coex) = setup(DriverConfig::single_pan());
    driver.set_coex_enabled(true);
    coex.with(|state| state.hold_off = true);

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    let Some(Call::StartCsmaTx { csma, .. }) = radio
        .calls()
        .into_iter()
        .find(|call| matches!(call, Call::StartCsmaTx { .. }))
    else {
        panic!("no csma transmit started");
    };
    assert_eq!(csma.cca_threshold_dbm, CCA_THRESHOLD_ALWAYS_BUSY);
}

#[test]
fn test_scheduler_status_fails_transmit() {
    use radio802154::radio::SchedulerStatus;

    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    radio.with(|state| state.scheduler_status = Some(SchedulerStatus::CcaCsmaTxFail));
    driver.on_hardware_event(HardwareEvents::SCHEDULER_STATUS);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Err(TxError::ChannelAccessFailure)));
}

#[test]
fn test_power_and_threshold_setters() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    driver.set_cca_threshold(-80);
    driver.set_transmit_power(8);
    assert_eq!(driver.cca_threshold(), -80);
    assert_eq!(driver.transmit_power(), 8);
    assert!(radio.calls().contains(&Call::SetCcaThreshold(-80)));
    assert!(radio.calls().contains(&Call::SetTxPower(8)));
}

/// 2015 data frame carrying a blank CSL IE followed by a header termination
fn csl_frame(seq: u8) -> Vec<u8> {
    let mut psdu = vec![0x41, 0xaa, seq, 0x34, 0x12, 0x02, 0x00, 0x01, 0x00];
    psdu.extend_from_slice(&[0x04, 0x0d, 0x00, 0x00, 0x00, 0x00]);
    psdu.extend_from_slice(&[0x80, 0x3f]);
    psdu.extend_from_slice(&[0xde, 0xad, 0x00, 0x00]);
    psdu
}

#[test]
fn test_csl_ie_refreshed_on_transmit() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    radio.with(|state| state.now_us = 1_000);
    driver.enable_csl(500, 0x0001, ExtAddress::new([0x11; 8]));
    driver.update_csl_sample_time(1_000 + 7 * 160);

    driver.transmit(Iid::PRIMARY, tx_frame(&csl_frame(1))).unwrap();
    let mut expected = csl_frame(1);
    expected[11..15].copy_from_slice(&[0x07, 0x00, 0xf4, 0x01]);
    assert_eq!(radio.last_tx(), Some(expected));
    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);
    driver.process(&mut mac);

    // Frames the upper layer already refreshed go out untouched
    let info = TxInfo {
        is_header_updated: true,
        ..Default::default()
    };
    let frame = TxFrame::new(CHANNEL, &csl_frame(2)).unwrap().with_info(info);
    driver.transmit(Iid::PRIMARY, frame).unwrap();
    assert_eq!(radio.last_tx(), Some(csl_frame(2)));
    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);
    driver.process(&mut mac);

    // Without CSL the IE is left as written
    driver.enable_csl(0, 0x0001, ExtAddress::new([0x11; 8]));
    driver.transmit(Iid::PRIMARY, tx_frame(&csl_frame(3))).unwrap();
    assert_eq!(radio.last_tx(), Some(csl_frame(3)));
}

#[test]
fn test_scheduler_failure_during_ack_clears_ack_only() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    driver.receive(Iid::PRIMARY, CHANNEL).unwrap();

    radio.set_incoming(&data_frame(1, true), 0);
    driver.on_hardware_event(HardwareEvents::RX_ACK_REQUESTED);
    assert_eq!(driver.sleep(), Err(RadioError::Busy));

    radio.with(|state| state.scheduler_status = Some(SchedulerStatus::EventInterrupted));
    driver.on_hardware_event(HardwareEvents::SCHEDULER_STATUS);
    assert_eq!(driver.sleep(), Ok(()));

    // A data transmit in flight survives the failed ACK
    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(2, false)))
        .unwrap();
    radio.set_incoming(&data_frame(3, true), 0);
    driver.on_hardware_event(HardwareEvents::RX_ACK_REQUESTED);
    radio.with(|state| state.scheduler_status = Some(SchedulerStatus::ScheduleFail));
    driver.on_hardware_event(HardwareEvents::SCHEDULER_STATUS);
    driver.process(&mut mac);
    assert!(mac.transmitted.is_empty());

    radio.with(|state| state.scheduler_status = None);
    driver.on_hardware_event(HardwareEvents::TX_PACKET_SENT);
    driver.process(&mut mac);
    assert_eq!(mac.last_status(), Some(Ok(())));

    // Without an ACK in flight the same status fails the transmit
    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(4, false)))
        .unwrap();
    radio.with(|state| state.scheduler_status = Some(SchedulerStatus::ScheduleFail));
    driver.on_hardware_event(HardwareEvents::SCHEDULER_STATUS);
    driver.process(&mut mac);
    assert_eq!(mac.transmitted.len(), 2);
    assert!(mac.last_status().unwrap().is_err());
}
