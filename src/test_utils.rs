//! A scripted stand-in for the NES used by the environment tests.
//!
//! It only models the RAM bytes the environment reads and writes: a title
//! screen that waits for START, a pre-level timer, a level clock, horizontal
//! movement, pits, pipes, flagpole slides, the castle cut-scene and the lives
//! counter.

use crate::action::Buttons;
use crate::emulator::{Emulator, FRAME_HEIGHT, FRAME_WIDTH, Frame};
use crate::error::EmulatorFault;
use crate::state::ram;

pub const START_X: u32 = 40;
pub const START_LIVES: u8 = 2;

/// Player routines the game runs while input is ignored.
pub const ROUTINE_PIPE: u8 = 0x03;
pub const ROUTINE_FLAGPOLE: u8 = 0x04;
const ROUTINE_NORMAL: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Title,
    PreLevel,
    Level,
    GameOver,
}

#[derive(Debug, Clone)]
pub struct ScriptedNes {
    ram: [u8; 0x800],
    mode: Mode,
    start_held: bool,
    clock: u32,
    dying_frames: u32,
    complete_frames: u32,
    flicker_armed: bool,
    flicker_active: bool,
    pipe_armed: bool,
    castle_frames_left: u32,
    pub frames: u64,
    pub resets: u32,
    /// Frames per in-game clock tick.
    pub tick_frames: u32,
    /// A pit opens under the player at this x.
    pub pit_x: Option<u32>,
    /// The flagpole is grabbed at this x.
    pub flag_x: Option<u32>,
    /// A single-frame bogus completion flag at this x.
    pub flicker_x: Option<u32>,
    /// The player drops into a pipe here and comes out in the next area.
    pub pipe_x: Option<u32>,
    pub pipe_exit_x: u32,
    /// Change-area timer loaded on pipe entry; 255 never shortens.
    pub pipe_timer: u8,
    /// The axe is reached here and the world-over cut-scene plays.
    pub castle_x: Option<u32>,
    pub castle_frames: u32,
    /// Frames the death animation plays before the life is taken.
    pub death_animation: u32,
    /// Frames after the flag before the next stage loads.
    pub stage_clear_frames: u32,
    /// `step` fails once `frames` reaches this value.
    pub fault_at: Option<u64>,
}

impl Default for ScriptedNes {
    fn default() -> Self {
        Self {
            ram: [0; 0x800],
            mode: Mode::Title,
            start_held: false,
            clock: 0,
            dying_frames: 0,
            complete_frames: 0,
            flicker_armed: true,
            flicker_active: false,
            pipe_armed: true,
            castle_frames_left: 0,
            frames: 0,
            resets: 0,
            tick_frames: 8,
            pit_x: None,
            flag_x: None,
            flicker_x: None,
            pipe_x: None,
            pipe_exit_x: START_X,
            pipe_timer: 40,
            castle_x: None,
            castle_frames: 20,
            death_animation: 30,
            stage_clear_frames: 10,
            fault_at: None,
        }
    }
}

impl ScriptedNes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pit(mut self, x: u32) -> Self {
        self.pit_x = Some(x);
        self
    }

    pub fn with_flag(mut self, x: u32) -> Self {
        self.flag_x = Some(x);
        self
    }

    pub fn with_pipe(mut self, x: u32, exit_x: u32) -> Self {
        self.pipe_x = Some(x);
        self.pipe_exit_x = exit_x;
        self
    }

    pub fn with_castle(mut self, x: u32) -> Self {
        self.castle_x = Some(x);
        self
    }

    pub fn ram(&self) -> &[u8; 0x800] {
        &self.ram
    }

    fn poke(&mut self, addr: u16, value: u8) {
        self.ram[addr as usize & 0x07FF] = value;
    }

    fn get(&self, addr: u16) -> u8 {
        self.ram[addr as usize & 0x07FF]
    }

    fn x(&self) -> u32 {
        self.get(ram::PLAYER_PAGE) as u32 * 256 + self.get(ram::PLAYER_X) as u32
    }

    fn set_x(&mut self, x: u32) {
        self.poke(ram::PLAYER_PAGE, (x / 256) as u8);
        self.poke(ram::PLAYER_X, (x % 256) as u8);
    }

    fn time(&self) -> u16 {
        ram::TIME_DIGITS
            .iter()
            .fold(0u16, |acc, &a| acc * 10 + self.get(a) as u16)
    }

    fn set_time(&mut self, time: u16) {
        self.poke(ram::TIME_DIGITS[0], (time / 100 % 10) as u8);
        self.poke(ram::TIME_DIGITS[1], (time / 10 % 10) as u8);
        self.poke(ram::TIME_DIGITS[2], (time % 10) as u8);
    }

    fn set_flag(&mut self, on: bool) {
        let (kind, float) = if on {
            (ram::FLAGPOLE, ram::FLOAT_STATE_COMPLETE)
        } else {
            (0, 0)
        };
        self.poke(ram::ENEMY_TYPES[0], kind);
        self.poke(ram::FLAGPOLE_FLOAT_STATE, float);
    }

    fn load_level(&mut self) {
        self.mode = Mode::Level;
        self.set_time(400);
        self.set_x(START_X);
        self.set_flag(false);
        self.poke(ram::PLAYER_ROUTINE, ROUTINE_NORMAL);
        self.poke(ram::CHANGE_AREA_TIMER, 0);
        self.poke(ram::PLAYER_Y_VIEWPORT, 1);
        self.poke(ram::PLAYER_Y_PIXEL, 176);
        self.poke(ram::GAME_ENGINE_MODE, ram::ENGINE_MODE_PLAYING);
        self.clock = 0;
        self.dying_frames = 0;
        self.complete_frames = 0;
        self.flicker_armed = true;
        self.flicker_active = false;
        self.pipe_armed = true;
        self.castle_frames_left = 0;
    }

    fn lose_life(&mut self) {
        let lives = self.get(ram::LIVES).wrapping_sub(1);
        self.poke(ram::LIVES, lives);
        if lives == 0xFF {
            self.mode = Mode::GameOver;
        } else {
            self.load_level();
        }
    }

    /// Hazards and goals at the player's current x.
    fn touch(&mut self, x: u32) {
        if self.pit_x.is_some_and(|pit| x >= pit) {
            self.poke(ram::PLAYER_ROUTINE, ram::ROUTINE_DYING);
        } else if self.pipe_armed && self.pipe_x.is_some_and(|px| x >= px) {
            self.pipe_armed = false;
            self.poke(ram::PLAYER_ROUTINE, ROUTINE_PIPE);
            self.poke(ram::CHANGE_AREA_TIMER, self.pipe_timer);
        } else if self.castle_x.is_some_and(|cx| x >= cx) {
            self.poke(ram::ENEMY_TYPES[0], ram::BOWSER);
            self.poke(ram::FLAGPOLE_FLOAT_STATE, ram::FLOAT_STATE_COMPLETE);
            self.poke(ram::GAME_ENGINE_MODE, ram::ENGINE_MODE_WORLD_OVER);
            self.castle_frames_left = self.castle_frames;
        } else if self.flag_x.is_some_and(|flag| x >= flag) {
            // Grabbing the pole starts the slide in the same frame.
            self.set_flag(true);
            self.poke(ram::PLAYER_ROUTINE, ROUTINE_FLAGPOLE);
        } else if self.flicker_armed && self.flicker_x.is_some_and(|fx| x >= fx) {
            self.flicker_armed = false;
            self.flicker_active = true;
            self.set_flag(true);
        }
    }

    fn run_level(&mut self, buttons: Buttons) {
        let routine = self.get(ram::PLAYER_ROUTINE);
        if routine == ram::ROUTINE_DEAD {
            self.lose_life();
            return;
        }
        if routine == ram::ROUTINE_DYING {
            self.dying_frames += 1;
            if self.dying_frames >= self.death_animation {
                self.lose_life();
            }
            return;
        }
        if self.flicker_active {
            // The bogus flag only lasts one frame.
            self.flicker_active = false;
            self.set_flag(false);
        }
        if self.get(ram::GAME_ENGINE_MODE) == ram::ENGINE_MODE_WORLD_OVER {
            // Remaining time drains into the score.
            let time = self.time().saturating_sub(1);
            self.set_time(time);
            self.castle_frames_left = self.castle_frames_left.saturating_sub(1);
            if self.castle_frames_left == 0 {
                let world = self.get(ram::WORLD);
                self.poke(ram::WORLD, (world + 1).min(7));
                self.poke(ram::STAGE, 0);
                self.poke(ram::AREA, 0);
                self.load_level();
            }
            return;
        }
        if routine == ROUTINE_PIPE {
            let timer = self.get(ram::CHANGE_AREA_TIMER).saturating_sub(1);
            self.poke(ram::CHANGE_AREA_TIMER, timer);
            if timer == 0 {
                let area = self.get(ram::AREA);
                self.poke(ram::AREA, area + 1);
                self.set_x(self.pipe_exit_x);
                self.poke(ram::PLAYER_ROUTINE, ROUTINE_NORMAL);
                self.touch(self.pipe_exit_x);
            }
            return;
        }
        if self.get(ram::FLAGPOLE_FLOAT_STATE) == ram::FLOAT_STATE_COMPLETE {
            self.complete_frames += 1;
            if self.complete_frames >= self.stage_clear_frames {
                let stage = self.get(ram::STAGE);
                self.poke(ram::STAGE, (stage + 1) % 4);
                self.load_level();
            }
            return;
        }

        let mut x = self.x() as i64;
        let speed = if buttons.contains(Buttons::B) { 3 } else { 2 };
        if buttons.contains(Buttons::RIGHT) {
            x += speed;
        } else if buttons.contains(Buttons::LEFT) {
            x = (x - speed).max(0);
        }
        self.set_x(x as u32);
        self.touch(x as u32);

        self.clock += 1;
        if self.clock >= self.tick_frames {
            self.clock = 0;
            let time = self.time().saturating_sub(1);
            self.set_time(time);
        }
    }
}

impl Emulator for ScriptedNes {
    fn reset(&mut self) -> Result<(), EmulatorFault> {
        self.ram = [0; 0x800];
        self.mode = Mode::Title;
        self.start_held = false;
        self.resets += 1;
        Ok(())
    }

    fn step(&mut self, buttons: Buttons) -> Result<(), EmulatorFault> {
        self.frames += 1;
        if self.fault_at.is_some_and(|at| self.frames >= at) {
            return Err(EmulatorFault::new("scripted fault"));
        }
        let start_pressed = buttons.contains(Buttons::START) && !self.start_held;
        self.start_held = buttons.contains(Buttons::START);

        match self.mode {
            Mode::Title => {
                if start_pressed {
                    self.mode = Mode::PreLevel;
                    self.poke(ram::LIVES, START_LIVES);
                    self.poke(ram::PRELEVEL_TIMER, 30);
                }
            }
            Mode::PreLevel => {
                let timer = self.get(ram::PRELEVEL_TIMER);
                if timer > 0 {
                    self.poke(ram::PRELEVEL_TIMER, timer - 1);
                } else {
                    self.load_level();
                }
            }
            Mode::Level => self.run_level(buttons),
            Mode::GameOver => {}
        }
        Ok(())
    }

    fn frame(&mut self) -> Frame {
        let mut frame = Frame::blank();
        debug_assert_eq!(frame.pixels.len(), FRAME_WIDTH * FRAME_HEIGHT * 3);
        frame.pixels[0] = self.get(ram::PLAYER_X);
        frame.pixels[1] = self.get(ram::PLAYER_PAGE);
        frame
    }

    fn read_memory(&self, addr: u16) -> u8 {
        self.get(addr)
    }

    fn write_memory(&mut self, addr: u16, value: u8) {
        self.poke(addr, value);
    }
}
