use serde::Serialize;

use crate::emulator::MemoryView;

// =============================================================================
// RAM Addresses
// =============================================================================

/// Super Mario Bros. (NTSC) work-RAM map.
pub mod ram {
    pub const PLAYER_ROUTINE: u16 = 0x000E;
    pub const ENEMY_TYPES: [u16; 5] = [0x0016, 0x0017, 0x0018, 0x0019, 0x001A];
    pub const FLAGPOLE_FLOAT_STATE: u16 = 0x001D;
    pub const PLAYER_PAGE: u16 = 0x006D;
    pub const PLAYER_X: u16 = 0x0086;
    pub const PLAYER_Y_VIEWPORT: u16 = 0x00B5;
    pub const PLAYER_Y_PIXEL: u16 = 0x03B8;
    pub const CHANGE_AREA_TIMER: u16 = 0x06DE;
    pub const LIVES: u16 = 0x075A;
    pub const POWERUP: u16 = 0x0756;
    pub const STAGE: u16 = 0x075C;
    pub const WORLD: u16 = 0x075F;
    pub const AREA: u16 = 0x0760;
    pub const GAME_ENGINE_MODE: u16 = 0x0770;
    pub const PRELEVEL_TIMER: u16 = 0x07A0;

    // One decimal digit per byte, most significant first.
    pub const SCORE_DIGITS: [u16; 6] = [0x07DE, 0x07DF, 0x07E0, 0x07E1, 0x07E2, 0x07E3];
    pub const COIN_DIGITS: [u16; 2] = [0x07ED, 0x07EE];
    pub const TIME_DIGITS: [u16; 3] = [0x07F8, 0x07F9, 0x07FA];

    /// Enemy type ids that end a stage when the float state reaches 3.
    pub const FLAGPOLE: u8 = 0x31;
    pub const BOWSER: u8 = 0x2D;
    pub const FLOAT_STATE_COMPLETE: u8 = 3;

    pub const ROUTINE_DEAD: u8 = 0x06;
    pub const ROUTINE_DYING: u8 = 0x0B;
    /// Pipe entry, vine climb, area transitions and other no-input states.
    pub const ROUTINE_BUSY: [u8; 7] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x07];

    pub const ENGINE_MODE_PLAYING: u8 = 0x01;
    pub const ENGINE_MODE_WORLD_OVER: u8 = 0x02;
}

// =============================================================================
// Game State
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Small,
    Tall,
    Fire,
    Dying,
}

impl PlayerState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerState::Small => "small",
            PlayerState::Tall => "tall",
            PlayerState::Fire => "fireball",
            PlayerState::Dying => "dying",
        }
    }
}

/// Game variables decoded from one frame of RAM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GameState {
    pub score: u32,
    pub time_remaining: u16,
    pub coins: u8,
    pub lives: u8,
    pub x_position: u32,
    pub y_position: u16,
    pub world: u8,
    pub stage: u8,
    pub area: u8,
    pub player_state: PlayerState,
    pub is_level_complete: bool,
    pub is_dead: bool,
    pub raw_player_state: u8,
    pub is_busy: bool,
    pub is_world_over: bool,
}

impl GameState {
    pub fn decode<M: MemoryView + ?Sized>(mem: &M) -> GameState {
        let routine = mem.peek(ram::PLAYER_ROUTINE);
        let viewport = mem.peek(ram::PLAYER_Y_VIEWPORT);
        let y_pixel = mem.peek(ram::PLAYER_Y_PIXEL) as u16;

        let y_position = if viewport < 1 {
            255 + (255 - y_pixel)
        } else {
            255 - y_pixel
        };

        // Falling out of the bottom of the screen counts as dying.
        let is_dead =
            routine == ram::ROUTINE_DYING || routine == ram::ROUTINE_DEAD || viewport > 1;

        let player_state = if is_dead {
            PlayerState::Dying
        } else {
            match mem.peek(ram::POWERUP) {
                0 => PlayerState::Small,
                1 => PlayerState::Tall,
                _ => PlayerState::Fire,
            }
        };

        let is_world_over = mem.peek(ram::GAME_ENGINE_MODE) == ram::ENGINE_MODE_WORLD_OVER;
        let is_stage_over = ram::ENEMY_TYPES.iter().any(|&addr| {
            let kind = mem.peek(addr);
            kind == ram::FLAGPOLE || kind == ram::BOWSER
        }) && mem.peek(ram::FLAGPOLE_FLOAT_STATE) == ram::FLOAT_STATE_COMPLETE;

        GameState {
            score: read_digits(mem, &ram::SCORE_DIGITS),
            time_remaining: read_digits(mem, &ram::TIME_DIGITS) as u16,
            coins: read_digits(mem, &ram::COIN_DIGITS) as u8,
            lives: mem.peek(ram::LIVES),
            x_position: mem.peek(ram::PLAYER_PAGE) as u32 * 256 + mem.peek(ram::PLAYER_X) as u32,
            y_position,
            world: mem.peek(ram::WORLD).wrapping_add(1),
            stage: mem.peek(ram::STAGE).wrapping_add(1),
            area: mem.peek(ram::AREA).wrapping_add(1),
            player_state,
            is_level_complete: is_world_over || is_stage_over,
            is_dead,
            raw_player_state: routine,
            is_busy: ram::ROUTINE_BUSY.contains(&routine),
            is_world_over,
        }
    }

    /// `"W-S"`, the way levels are usually named.
    pub fn level_name(&self) -> String {
        format!("{}-{}", self.world, self.stage)
    }
}

/// Combines decimal digits stored one per byte (low nibble).
fn read_digits<M: MemoryView + ?Sized>(mem: &M, digits: &[u16]) -> u32 {
    digits
        .iter()
        .fold(0u32, |acc, &addr| acc * 10 + (mem.peek(addr) & 0x0F) as u32)
}
