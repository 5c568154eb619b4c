use radio802154::{
    config::{DriverConfig, Iid},
    driver::{RadioState, RSSI_INVALID, RSSI_INVALID_QUARTER_DBM},
    radio::{HardwareEvents, SchedulerStatus},
    RadioDriver, RadioError,
};

use mock::{
    data_frame, setup, tx_frame, Call, MockCoex, MockRadio, RecordingMac, RssiDelay, CHANNEL,
};

#[test]
fn test_async_energy_scan() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    driver.receive(Iid::PRIMARY, CHANNEL).unwrap();
    radio.clear_calls();

    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
    assert_eq!(driver.state(), RadioState::Sleep);
    assert!(radio.calls().contains(&Call::Idle));
    assert!(radio.calls().contains(&Call::StartAverageRssi {
        channel: 20,
        duration_us: 2_000,
    }));
    assert_eq!(driver.poll_energy_scan(), Err(nb::Error::WouldBlock));

    driver.process(&mut mac);
    assert!(mac.scans.is_empty());

    radio.with(|state| state.average_rssi = -322);
    driver.on_hardware_event(HardwareEvents::RSSI_AVERAGE_DONE);
    assert_eq!(driver.poll_energy_scan(), Ok(-80));

    driver.process(&mut mac);
    assert_eq!(mac.scans, vec![(Iid::PRIMARY, -80)]);
    assert_eq!(
        driver.poll_energy_scan(),
        Err(nb::Error::Other(RadioError::InvalidState))
    );
}

#[test]
fn test_scan_in_progress_is_busy() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
    assert_eq!(driver.energy_scan(Iid::PRIMARY, 25, 8), Err(RadioError::Busy));
    assert_eq!(
        radio.count(|call| matches!(call, Call::StartAverageRssi { .. })),
        1
    );

    // A completed result still holds the scan until delivered
    radio.with(|state| state.average_rssi = -400);
    driver.on_hardware_event(HardwareEvents::RSSI_AVERAGE_DONE);
    assert_eq!(driver.energy_scan(Iid::PRIMARY, 25, 8), Err(RadioError::Busy));

    driver.process(&mut mac);
    assert_eq!(mac.scans, vec![(Iid::PRIMARY, -100)]);
    driver.energy_scan(Iid::PRIMARY, 25, 8).unwrap();
}

#[test]
fn test_scan_start_failure_reports_invalid() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    radio.with(|state| state.fail_average_rssi = true);

    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
    driver.process(&mut mac);
    assert_eq!(mac.scans, vec![(Iid::PRIMARY, RSSI_INVALID)]);
}

#[test]
fn test_scheduler_failure_completes_scan() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
    radio.with(|state| state.scheduler_status = Some(SchedulerStatus::AverageRssiFail));
    driver.on_hardware_event(HardwareEvents::SCHEDULER_STATUS);
    driver.process(&mut mac);
    assert_eq!(mac.scans, vec![(Iid::PRIMARY, RSSI_INVALID)]);
}

#[test]
fn test_invalid_hardware_average() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();

    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
    radio.with(|state| state.average_rssi = RSSI_INVALID_QUARTER_DBM);
    driver.on_hardware_event(HardwareEvents::RSSI_AVERAGE_DONE);
    driver.process(&mut mac);
    assert_eq!(mac.scans, vec![(Iid::PRIMARY, RSSI_INVALID)]);
}

#[test]
fn test_energy_scan_argument_checks() {
    let driver: RadioDriver<MockRadio, MockCoex> =
        RadioDriver::new(MockRadio::new(), MockCoex::new(), DriverConfig::single_pan());
    assert_eq!(
        driver.energy_scan(Iid::PRIMARY, 20, 2),
        Err(RadioError::InvalidState)
    );

    let (driver, _, _) = setup(DriverConfig::single_pan());
    assert_eq!(driver.energy_scan(Iid::PRIMARY, 27, 2), Err(RadioError::InvalidArgs));
    assert_eq!(
        driver.energy_scan(Iid::BROADCAST, 20, 2),
        Err(RadioError::InvalidArgs)
    );
}

#[test]
fn test_energy_scan_busy_during_transmit() {
    let (driver, _, _) = setup(DriverConfig::single_pan());
    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    assert_eq!(driver.energy_scan(Iid::PRIMARY, 20, 2), Err(RadioError::Busy));
}

#[test]
fn test_sync_rssi() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    driver.receive(Iid::PRIMARY, CHANNEL).unwrap();
    radio.with(|state| state.average_rssi = -200);

    let mut delay = RssiDelay::new(&driver, Some(5));
    assert_eq!(driver.rssi(&mut delay), -50);
    assert_eq!(delay.elapsed, 5);
    assert!(radio.calls().contains(&Call::StartAverageRssi {
        channel: CHANNEL,
        duration_us: 16,
    }));

    // Sync results are never delivered as scan callbacks
    let mut mac = RecordingMac::new();
    driver.process(&mut mac);
    assert!(mac.scans.is_empty());
    assert_eq!(
        driver.poll_energy_scan(),
        Err(nb::Error::Other(RadioError::InvalidState))
    );
}

#[test]
fn test_sync_rssi_timeout() {
    let (driver, radio, _) = setup(DriverConfig::single_pan().with_sync_rssi_timeout(50));
    radio.clear_calls();

    let mut delay = RssiDelay::new(&driver, None);
    assert_eq!(driver.rssi(&mut delay), RSSI_INVALID);
    assert_eq!(delay.elapsed, 50);

    // The abandoned average was stopped
    assert_eq!(radio.calls().last(), Some(&Call::Idle));
    assert_eq!(radio.count(|call| *call == Call::Idle), 2);

    // The scan state was reset
    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
}

#[test]
fn test_sync_rssi_unavailable() {
    let driver: RadioDriver<MockRadio, MockCoex> =
        RadioDriver::new(MockRadio::new(), MockCoex::new(), DriverConfig::single_pan());
    let mut delay = RssiDelay::new(&driver, Some(1));
    assert_eq!(driver.rssi(&mut delay), RSSI_INVALID);
    assert_eq!(delay.elapsed, 0);

    let (driver, _, _) = setup(DriverConfig::single_pan());
    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
    let mut delay = RssiDelay::new(&driver, Some(1));
    assert_eq!(driver.rssi(&mut delay), RSSI_INVALID);

    let (driver, _, _) = setup(DriverConfig::single_pan());
    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
    let mut delay = RssiDelay::new(&driver, Some(1));
    assert_eq!(driver.rssi(&mut delay), RSSI_INVALID);
}

#[test]
fn test_sleep_aborts_energy_scan() {
    let (driver, radio, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    driver.receive(Iid::PRIMARY, CHANNEL).unwrap();
    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
    radio.clear_calls();

    driver.sleep().unwrap();
    assert_eq!(radio.calls(), vec![Call::Idle]);
    assert_eq!(driver.poll_energy_scan(), Ok(RSSI_INVALID));

    driver.process(&mut mac);
    assert_eq!(mac.scans, vec![(Iid::PRIMARY, RSSI_INVALID)]);

    // A late average is ignored and the radio is free again
    driver.on_hardware_event(HardwareEvents::RSSI_AVERAGE_DONE);
    driver.process(&mut mac);
    assert_eq!(mac.scans.len(), 1);
    driver
        .transmit(Iid::PRIMARY, tx_frame(&data_frame(1, false)))
        .unwrap();
}

#[test]
fn test_disable_aborts_energy_scan() {
    let (driver, _, _) = setup(DriverConfig::single_pan());
    let mut mac = RecordingMac::new();
    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();

    driver.disable().unwrap();
    driver.process(&mut mac);
    assert_eq!(mac.scans, vec![(Iid::PRIMARY, RSSI_INVALID)]);

    driver.enable().unwrap();
    driver.energy_scan(Iid::PRIMARY, 20, 2).unwrap();
}
