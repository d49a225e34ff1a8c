//! AdamNet service-loop scenarios against a scripted transport and a
//! disk drive backed by an in-memory FD720 image.

use std::io::Cursor;

use bus_core::{DeviceSlotTable, ScriptedTransport, checksum::xor_checksum};
use bus_adamnet::AdamnetBus;
use devices::DiskDevice;
use media_image::{AccessMode, MediaImage, MediaType};

const DISK: u8 = 0x4;

fn mounted_bus() -> AdamnetBus<ScriptedTransport> {
    let mut data = vec![0u8; 737_280];
    for (i, b) in data.iter_mut().enumerate().take(512) {
        *b = (i % 251) as u8;
    }
    let image = MediaImage::mount(
        Cursor::new(data),
        MediaType::ImgFd720,
        737_280,
        AccessMode::ReadWrite,
    )
    .expect("mounts");
    let mut drive = DiskDevice::new();
    drive.mount(image);

    let mut table = DeviceSlotTable::new(16);
    table.insert(0, DISK, 1, Box::new(drive)).expect("slot free");
    AdamnetBus::new(ScriptedTransport::new(), table)
}

/// Script one SEND packet: control byte, BE length, payload, checksum.
fn push_send(bus: &mut AdamnetBus<ScriptedTransport>, dev: u8, payload: &[u8]) {
    let t = bus.transport_mut();
    t.push_input(&[0x60 | dev]);
    let len = payload.len() as u16;
    t.push_input(&[(len >> 8) as u8, (len & 0xFF) as u8]);
    t.push_input(payload);
    t.push_input(&[xor_checksum(payload)]);
}

fn push_block_num(bus: &mut AdamnetBus<ScriptedTransport>, dev: u8, block: u32) {
    push_send(bus, dev, &block.to_le_bytes());
}

#[test]
fn status_packet_reports_block_size() {
    let mut bus = mounted_bus();
    bus.transport_mut().push_input(&[0x10 | DISK]);
    bus.service();

    let out = bus.transport_mut().output().to_vec();
    assert_eq!(out.len(), 6);
    assert_eq!(out[0], 0x80 | DISK);
    // 512-byte blocks, little-endian, block-device type, status OK.
    assert_eq!(&out[1..5], &[0x00, 0x02, 0x01, 0x40]);
    assert_eq!(out[5], xor_checksum(&out[1..5]));
}

#[test]
fn status_with_no_media_reports_error() {
    let mut table = DeviceSlotTable::new(16);
    let drive: DiskDevice<Cursor<Vec<u8>>> = DiskDevice::new();
    table.insert(0, DISK, 1, Box::new(drive)).expect("slot free");
    let mut bus = AdamnetBus::new(ScriptedTransport::new(), table);

    bus.transport_mut().push_input(&[0x10 | DISK]);
    bus.service();
    let out = bus.transport_mut().output().to_vec();
    assert_eq!(out[4], 0x43);
}

#[test]
fn receive_then_clr_delivers_block_zero() {
    let mut bus = mounted_bus();
    push_block_num(&mut bus, DISK, 0);
    bus.service();
    assert_eq!(bus.transport_mut().output(), &[0x90 | DISK]);
    bus.transport_mut().clear_output();

    // RECEIVE stages the block and ACKs.
    bus.transport_mut().push_input(&[0x40 | DISK]);
    bus.service();
    assert_eq!(bus.transport_mut().output(), &[0x90 | DISK]);
    bus.transport_mut().clear_output();

    // CLR pulls the data packet.
    bus.transport_mut().push_input(&[0x30 | DISK]);
    bus.service();
    let out = bus.transport_mut().output().to_vec();
    assert_eq!(out[0], 0xB0 | DISK);
    assert_eq!(&out[1..3], &[0x02, 0x00]); // 512, big-endian
    assert_eq!(out[3], 0);
    assert_eq!(out[4], 1);
    assert_eq!(out[3 + 512], xor_checksum(&out[3..3 + 512]));
}

#[test]
fn clr_without_receive_sends_nothing() {
    let mut bus = mounted_bus();
    bus.transport_mut().push_input(&[0x30 | DISK]);
    bus.service();
    assert!(bus.transport_mut().output().is_empty());
}

#[test]
fn block_write_round_trips() {
    let mut bus = mounted_bus();
    push_block_num(&mut bus, DISK, 7);
    bus.service();
    bus.transport_mut().clear_output();

    push_send(&mut bus, DISK, &[0xA5u8; 512]);
    bus.service();
    assert_eq!(bus.transport_mut().output(), &[0x90 | DISK]);
    bus.transport_mut().clear_output();

    // The write cleared the selection; select again and read back.
    push_block_num(&mut bus, DISK, 7);
    bus.service();
    bus.transport_mut().clear_output();
    bus.transport_mut().push_input(&[0x40 | DISK]);
    bus.service();
    bus.transport_mut().clear_output();
    bus.transport_mut().push_input(&[0x30 | DISK]);
    bus.service();
    let out = bus.transport_mut().output().to_vec();
    assert!(out[3..3 + 512].iter().all(|&b| b == 0xA5));
}

#[test]
fn corrupt_send_naks_without_mutation() {
    let mut bus = mounted_bus();
    push_block_num(&mut bus, DISK, 3);
    bus.service();
    bus.transport_mut().clear_output();

    let payload = [0x11u8; 512];
    {
        let t = bus.transport_mut();
        t.push_input(&[0x60 | DISK, 0x02, 0x00]);
        t.push_input(&payload);
        t.push_input(&[xor_checksum(&payload) ^ 0xFF]);
    }
    bus.service();
    assert_eq!(bus.transport_mut().output(), &[0xC0 | DISK]);

    // Block 3 is untouched.
    bus.transport_mut().clear_output();
    push_block_num(&mut bus, DISK, 3);
    bus.service();
    bus.transport_mut().clear_output();
    bus.transport_mut().push_input(&[0x40 | DISK]);
    bus.service();
    bus.transport_mut().clear_output();
    bus.transport_mut().push_input(&[0x30 | DISK]);
    bus.service();
    let out = bus.transport_mut().output().to_vec();
    assert!(out[3..3 + 512].iter().all(|&b| b == 0));
}

#[test]
fn receive_without_block_selection_naks() {
    let mut bus = mounted_bus();
    bus.transport_mut().push_input(&[0x40 | DISK]);
    bus.service();
    assert_eq!(bus.transport_mut().output(), &[0xC0 | DISK]);
}

#[test]
fn out_of_range_block_naks_on_receive() {
    let mut bus = mounted_bus();
    push_block_num(&mut bus, DISK, 5000);
    bus.service();
    bus.transport_mut().clear_output();
    bus.transport_mut().push_input(&[0x40 | DISK]);
    bus.service();
    assert_eq!(bus.transport_mut().output(), &[0xC0 | DISK]);
}

#[test]
fn unknown_device_stays_silent() {
    let mut bus = mounted_bus();
    bus.transport_mut().push_input(&[0x10 | 0x9]);
    bus.service();
    assert!(bus.transport_mut().output().is_empty());
}

#[test]
fn ready_acks() {
    let mut bus = mounted_bus();
    bus.transport_mut().push_input(&[0xD0 | DISK]);
    bus.service();
    assert_eq!(bus.transport_mut().output(), &[0x90 | DISK]);
}

#[test]
fn format_block_number_triggers_format() {
    let mut bus = mounted_bus();
    push_block_num(&mut bus, DISK, 0xFACE);
    bus.service();
    assert_eq!(bus.transport_mut().output(), &[0x90 | DISK]);
}
