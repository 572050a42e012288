use anyhow::{Context, Result};
use std::path::Path;
use tetanes_core::control_deck::HeadlessMode;
use tetanes_core::input::JoypadBtnState;
use tetanes_core::mem::{Read, Write};
use tetanes_core::prelude::*;
use tracing::info;

use crate::action::Buttons;
use crate::emulator::{Emulator, FRAME_WIDTH, Frame};
use crate::env::{EnvConfig, MarioEnv};
use crate::error::EmulatorFault;

const BUTTON_MAP: [(Buttons, JoypadBtnState); 8] = [
    (Buttons::RIGHT, JoypadBtnState::RIGHT),
    (Buttons::LEFT, JoypadBtnState::LEFT),
    (Buttons::DOWN, JoypadBtnState::DOWN),
    (Buttons::UP, JoypadBtnState::UP),
    (Buttons::START, JoypadBtnState::START),
    (Buttons::SELECT, JoypadBtnState::SELECT),
    (Buttons::B, JoypadBtnState::B),
    (Buttons::A, JoypadBtnState::A),
];

/// Headless TetaNES control deck driven one frame at a time.
pub struct TetanesEmulator {
    deck: ControlDeck,
}

impl TetanesEmulator {
    pub fn load(rom_path: &Path) -> Result<Self> {
        let mut deck = ControlDeck::new();
        // Video stays on: frames are the observations.
        deck.set_headless_mode(HeadlessMode::NO_AUDIO);
        deck.load_rom_path(rom_path)
            .with_context(|| format!("Failed to load ROM: {}", rom_path.display()))?;
        info!("loaded ROM {}", rom_path.display());
        Ok(Self { deck })
    }

    fn set_input(&mut self, buttons: Buttons) {
        let joypad = self.deck.joypad_mut(Player::One);
        for (bit, button) in BUTTON_MAP {
            joypad.set_button(button, buttons.contains(bit));
        }
        // Turbo is never part of an action.
        joypad.set_button(JoypadBtnState::TURBO_A, false);
        joypad.set_button(JoypadBtnState::TURBO_B, false);
    }
}

impl Emulator for TetanesEmulator {
    fn reset(&mut self) -> Result<(), EmulatorFault> {
        self.deck.reset(ResetKind::Hard);
        self.set_input(Buttons::NOOP);
        Ok(())
    }

    fn step(&mut self, buttons: Buttons) -> Result<(), EmulatorFault> {
        self.set_input(buttons);
        self.deck
            .clock_frame()
            .map_err(|e| EmulatorFault::new(e.to_string()))?;
        Ok(())
    }

    fn frame(&mut self) -> Frame {
        Frame::from_rgba(FRAME_WIDTH, self.deck.frame_buffer())
    }

    fn read_memory(&self, addr: u16) -> u8 {
        self.deck.bus().peek(addr)
    }

    fn write_memory(&mut self, addr: u16, value: u8) {
        self.deck.bus_mut().write(addr, value);
    }
}

/// Loads the configured ROM into a fresh control deck and wraps it in an
/// environment.
pub fn open(config: EnvConfig) -> Result<MarioEnv<TetanesEmulator>> {
    let emulator = TetanesEmulator::load(&config.rom_path)?;
    let env = MarioEnv::new(emulator, config).context("Invalid environment configuration")?;
    Ok(env)
}
