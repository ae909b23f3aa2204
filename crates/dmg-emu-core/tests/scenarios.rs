mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dmg_emu_core::{
    EmuError, GameBoy, RunConfig,
    cpu::RunState,
    frame_exchange::frame_exchange,
    joypad::{Button, SharedButtons},
};

fn boot(code: &[u8]) -> GameBoy {
    GameBoy::from_rom(common::build_rom(0x00, 0x00, 0x00, code)).unwrap()
}

#[test]
fn fibonacci_program_fills_registers() {
    let code = [
        0x0E, 0x02, // LD C,2
        0x3E, 0x01, // LD A,1
        0x81, 0x47, // ADD A,C ; LD B,A
        0x81, 0x4F, // ADD A,C ; LD C,A
        0x80, 0x57, // ADD A,B ; LD D,A
        0x81, 0x5F, // ADD A,C ; LD E,A
        0x82, 0x67, // ADD A,D ; LD H,A
        0x83, 0x6F, // ADD A,E ; LD L,A
        0x18, 0xFE, // JR -2
    ];
    let mut gb = boot(&code);
    assert!(gb.run_until(10_000, |gb| gb.cpu.regs.pc == 0x0110).unwrap());

    let snap = gb.snapshot();
    assert_eq!(snap.register("B"), Some("03"));
    assert_eq!(snap.register("C"), Some("05"));
    assert_eq!(snap.register("D"), Some("08"));
    assert_eq!(snap.register("E"), Some("0D"));
    assert_eq!(snap.register("H"), Some("15"));
    assert_eq!(snap.register("L"), Some("22"));
    assert_eq!(snap.register("HL"), Some("1522"));
}

#[test]
fn serial_output_is_captured() {
    let mut code = Vec::new();
    for &c in b"Passed" {
        code.extend_from_slice(&[
            0x3E, c, // LD A,c
            0xE0, 0x01, // LDH (SB),A
            0x3E, 0x81, // LD A,0x81
            0xE0, 0x02, // LDH (SC),A
            0xF0, 0x02, // LDH A,(SC)
            0xCB, 0x7F, // BIT 7,A
            0x20, 0xFA, // JR NZ,-6
        ]);
    }
    let end = common::MAIN + code.len() as u16;
    code.extend_from_slice(&[0x18, 0xFE]);

    let mut gb = GameBoy::from_rom(common::build_rom_with_main(&code)).unwrap();
    assert!(gb.run_until(200_000, |gb| gb.cpu.regs.pc == end).unwrap());
    let mut checked = 0;
    assert!(common::serial_contains_result(
        gb.mmu.peek_serial(),
        &mut checked
    ));
    assert_eq!(String::from_utf8(gb.take_serial()).unwrap(), "Passed");
}

#[test]
fn timer_interrupt_wakes_halt() {
    let code = [
        0x3E, 0x04, 0xE0, 0xFF, // IE = timer
        0x3E, 0x05, 0xE0, 0x07, // TAC = enabled, 16 cycles
        0xAF, 0xE0, 0x0F, // IF = 0
        0xFB, 0x76, // EI ; HALT
        0x00, 0x18, 0xFE, // NOP ; JR -2
    ];
    let mut rom = common::build_rom(0x00, 0x00, 0x00, &code);
    // Timer vector: LD B,0x42 ; RETI
    rom[0x0050..0x0053].copy_from_slice(&[0x06, 0x42, 0xD9]);
    let mut gb = GameBoy::from_rom(rom).unwrap();

    assert!(gb.run_until(1_000, |gb| gb.cpu.state == RunState::Halted).unwrap());
    assert!(gb.run_until(10_000, |gb| gb.cpu.regs.b() == 0x42).unwrap());
    assert!(gb.run_until(100, |gb| gb.cpu.regs.pc >= 0x010E).unwrap());
    assert!(gb.cpu.ime);
    assert_eq!(gb.cpu.state, RunState::Running);
}

#[test]
fn stop_waits_for_a_button() {
    let code = [
        0x10, 0x00, // STOP
        0x3C, // INC A
        0x18, 0xFE, // JR -2
    ];
    let buttons = SharedButtons::new();
    let mut gb = boot(&code);
    gb.set_input_provider(Box::new(buttons.clone()));

    gb.run_for_cycles(2_000).unwrap();
    assert_eq!(gb.cpu.state, RunState::Stopped);
    assert_eq!(gb.cpu.regs.a(), 0x01);
    // STOP resets the divider.
    assert!(gb.mmu.read_byte(0xFF04) < 0x10);

    buttons.press(Button::A);
    gb.step().unwrap();
    assert_eq!(gb.cpu.state, RunState::Running);
    assert_eq!(gb.cpu.regs.a(), 0x02);
}

#[test]
fn illegal_opcode_stops_the_machine() {
    let mut gb = boot(&[0x00, 0xD3]);
    gb.step().unwrap();
    let expected = EmuError::IllegalOpcode {
        opcode: 0xD3,
        pc: 0x0101,
    };
    assert_eq!(gb.step().unwrap_err(), expected);
    assert_eq!(gb.cpu.fault(), Some(&expected));

    // Stays dead: no more cycles are spent.
    let cycles = gb.cpu.cycles;
    assert_eq!(gb.step().unwrap_err(), expected);
    assert_eq!(gb.cpu.cycles, cycles);
}

#[test]
fn run_loop_honours_stop_flag() {
    let mut gb = boot(&[0x18, 0xFE]);
    let (producer, mut consumer) = frame_exchange();
    gb.set_frame_sink(producer);

    let stop = AtomicBool::new(false);
    let config = RunConfig {
        speed: 0.0,
        snapshot_interval: Duration::ZERO,
        ..RunConfig::default()
    };
    let mut snapshots = Vec::new();
    gb.run(&config, &stop, |snap| {
        snapshots.push(snap.clone());
        if snapshots.len() == 3 {
            stop.store(true, Ordering::Relaxed);
        }
    })
    .unwrap();

    assert_eq!(snapshots.len(), 3);
    assert!(snapshots[2].cycles > snapshots[0].cycles);
    assert!(gb.frames() >= 2);
    assert!(consumer.take().is_some());
}

#[test]
fn run_loop_is_paced_to_wall_clock() {
    let mut gb = boot(&[0x18, 0xFE]);
    let stop = AtomicBool::new(false);

    std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(100));
            stop.store(true, Ordering::Relaxed);
        });
        gb.run(&RunConfig::default(), &stop, |_| {}).unwrap();
    });

    // 100 ms of real time is about 420k cycles; allow for slow schedulers
    // but not for free-running.
    assert!(gb.cpu.cycles > 0);
    assert!(gb.cpu.cycles < 4_194_304, "ran {} cycles", gb.cpu.cycles);
}

#[test]
fn run_loop_returns_fatal_error() {
    let mut gb = boot(&[0xDD]);
    let stop = AtomicBool::new(false);
    let err = gb.run(&RunConfig::default(), &stop, |_| {}).unwrap_err();
    assert_eq!(
        err,
        EmuError::IllegalOpcode {
            opcode: 0xDD,
            pc: 0x0100,
        }
    );
}
