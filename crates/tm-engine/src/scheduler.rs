//! Row and tick scheduling.
//!
//! Walks the song's order list one tick at a time. Each row lasts
//! `speed + frame_delay` ticks and is played `1 + pattern_delay` times;
//! the first tick of a fresh row dispatches its cells, every other tick
//! runs the continuous effects.

use tm_ir::{Cell, Effect, OrderEntry};
use tracing::debug;

use crate::config::Repeat;
use crate::engine::Engine;
use crate::transport::TransportState;

/// Position and timing of playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayState {
    pub transport: TransportState,
    /// Ticks keep running but rows do not advance
    pub paused: bool,
    /// The song ended and will not restart
    pub finished: bool,
    /// The first row has been read
    pub started: bool,
    pub order: usize,
    pub pattern: u8,
    pub row: u16,
    /// Ticks per row
    pub speed: u8,
    pub tempo: u8,
    /// Global volume (0-128)
    pub global_volume: i32,
    /// Tick within the current row, 0 on the first
    pub tick: u32,
    /// Ticks left in the current row
    pub tick_count: u32,
    /// Passes of the current row left
    pub row_count: u32,
    /// The current pass repeats a row (SEx)
    pub repeat_row: bool,
    /// Extra ticks requested by S6x on this row
    pub frame_delay: u8,
    /// Row repeats requested by SEx on this row
    pub pattern_delay: Option<u8>,
    pub break_row: Option<u16>,
    pub jump_order: Option<usize>,
    /// Row to return to for SBx
    pub loop_row: Option<u16>,
    /// Times the song has restarted
    pub repeats_done: u32,
    /// Playback ends on reaching this order and row
    pub stop_at: Option<(usize, u16)>,
    /// Output frames per tick at the current tempo
    pub samples_per_tick: u32,
    /// Frames left before the next tick
    pub tick_samples_left: u32,
}

impl PlayState {
    pub fn new(speed: u8, tempo: u8, global_volume: u8) -> Self {
        Self {
            transport: TransportState::Stopped,
            paused: false,
            finished: false,
            started: false,
            order: 0,
            pattern: 0,
            row: 0,
            speed: speed.max(1),
            tempo,
            global_volume: global_volume.min(128) as i32,
            tick: 0,
            tick_count: 1,
            row_count: 1,
            repeat_row: false,
            frame_delay: 0,
            pattern_delay: None,
            break_row: None,
            jump_order: None,
            loop_row: None,
            repeats_done: 0,
            stop_at: None,
            samples_per_tick: 0,
            tick_samples_left: 0,
        }
    }

    /// Ticks in the current row.
    fn row_ticks(&self) -> u32 {
        self.speed as u32 + self.frame_delay as u32
    }
}

/// Output frames per tick: `rate * 2.5 / tempo`, scaled by `tempo_factor / 128`.
pub fn samples_per_tick(sample_rate: u32, tempo: u8, tempo_factor: u32) -> u32 {
    let num = sample_rate as u64 * 5 * tempo_factor as u64;
    let den = (tempo.max(1) as u64) << 8;
    (num / den).max(1) as u32
}

impl Engine {
    /// Advance playback by one tick. Returns false once the song has ended.
    pub(crate) fn process_tick(&mut self) -> bool {
        if self.play.finished {
            return false;
        }
        if self.play.tempo == 0 {
            self.play.finished = true;
            debug!(order = self.play.order, row = self.play.row, "tempo 0, song finished");
            return false;
        }
        if !self.play.paused && !self.advance_tick() {
            self.play.finished = true;
            debug!(order = self.play.order, row = self.play.row, "song finished");
            return false;
        }
        self.process_voices();
        self.update_tick_length();
        true
    }

    pub(crate) fn update_tick_length(&mut self) {
        let cfg = &self.ctx.config;
        self.play.samples_per_tick = samples_per_tick(cfg.sample_rate, self.play.tempo, cfg.tempo_factor);
    }

    fn advance_tick(&mut self) -> bool {
        for chan in &mut self.channels {
            chan.clear_modulation();
        }

        self.play.tick_count = self.play.tick_count.saturating_sub(1);
        if self.play.tick_count == 0 {
            self.play.tick = 0;
            self.play.row_count = self.play.row_count.saturating_sub(1);
            if self.play.row_count == 0 {
                if !self.next_row() {
                    return false;
                }
                self.play.repeat_row = false;
                self.play.frame_delay = 0;
                self.play.pattern_delay = None;
                self.read_row();
                let p = &mut self.play;
                p.row_count = 1 + p.pattern_delay.unwrap_or(0) as u32;
                p.tick_count = p.row_ticks();
                if p.transport == TransportState::SingleStep {
                    p.paused = true;
                }
            } else {
                self.play.repeat_row = true;
                self.play.tick_count = self.play.row_ticks();
                self.continuous_effects(0);
            }
        } else {
            self.play.tick += 1;
            self.continuous_effects(self.play.tick);
        }

        for ch in 0..self.channels.len() {
            self.modulation(ch, self.play.tick);
        }
        true
    }

    /// Read the cells of the current row into the channels and dispatch them.
    fn read_row(&mut self) {
        let (pattern, row) = (self.play.pattern as usize, self.play.row);
        for ch in 0..self.channels.len() {
            let cell = self
                .song
                .patterns
                .get(pattern)
                .and_then(|p| p.get(row, ch))
                .copied()
                .unwrap_or(Cell::empty());
            let chan = &mut self.channels[ch];
            chan.cell = cell;
            chan.note_cut = None;
            chan.note_delay = None;
            match cell.effect {
                Effect::NoteDelay(ticks) if ticks > 0 => chan.note_delay = Some(ticks),
                _ => self.dispatch_cell(ch, cell),
            }
        }
    }

    /// Tick handlers for every channel.
    fn continuous_effects(&mut self, tick: u32) {
        for ch in 0..self.channels.len() {
            let chan = &self.channels[ch];
            let cell = chan.cell;
            if chan.note_delay.is_some() {
                self.tick_effect(ch, cell.effect, tick);
                continue;
            }
            self.tick_volume(ch, cell.volume);
            self.tick_effect(ch, cell.effect, tick);
        }
    }

    /// Move to the next row, following breaks, jumps and loops.
    ///
    /// Returns false when the song is over.
    fn next_row(&mut self) -> bool {
        let fixed_pattern = matches!(
            self.play.transport,
            TransportState::PatternLoop | TransportState::SingleStep
        );
        let previous_order = self.play.order;

        if self.play.started {
            let rows = self.pattern_rows(self.play.pattern);
            let p = &mut self.play;
            if fixed_pattern {
                p.jump_order = None;
                p.row = match (p.loop_row.take(), p.break_row.take()) {
                    (Some(row), _) | (None, Some(row)) => row,
                    _ if p.row + 1 >= rows => 0,
                    _ => p.row + 1,
                };
            } else if let Some(order) = p.jump_order.take() {
                p.order = order;
                p.row = p.break_row.take().unwrap_or(0);
                p.loop_row = None;
            } else if let Some(row) = p.break_row.take() {
                p.order += 1;
                p.row = row;
                p.loop_row = None;
            } else if let Some(row) = p.loop_row.take() {
                p.row = row;
            } else {
                p.row += 1;
                if p.row >= rows {
                    p.order += 1;
                    p.row = 0;
                }
            }
        }
        self.play.started = true;

        if !fixed_pattern && !self.resolve_order() {
            return false;
        }
        if self.play.row >= self.pattern_rows(self.play.pattern) {
            self.play.row = 0;
        }
        if self.play.order != previous_order {
            for chan in &mut self.channels {
                chan.pattern_loop_row = 0;
                chan.pattern_loop_count = 0;
            }
        }
        if self.play.stop_at == Some((self.play.order, self.play.row)) {
            debug!(order = self.play.order, row = self.play.row, "reached stop position");
            return false;
        }
        true
    }

    /// Step over skip markers; wrap or stop at the end of the list.
    ///
    /// An order naming a pattern past the pattern table ends the song like `End`.
    fn resolve_order(&mut self) -> bool {
        let limit = 2 * self.song.order.len() + 2;
        for _ in 0..limit {
            let entry = self.song.order.get(self.play.order).copied();
            match entry {
                Some(OrderEntry::Pattern(idx)) if (idx as usize) < self.song.patterns.len() => {
                    self.play.pattern = idx;
                    return true;
                }
                Some(OrderEntry::Skip) => self.play.order += 1,
                Some(OrderEntry::Pattern(idx)) => {
                    debug!(order = self.play.order, pattern = idx, "order names a missing pattern");
                    if !self.restart_allowed() {
                        return false;
                    }
                    self.play.order = 0;
                    self.play.row = 0;
                }
                Some(OrderEntry::End) | None => {
                    if !self.restart_allowed() {
                        return false;
                    }
                    self.play.order = 0;
                    self.play.row = 0;
                }
            }
        }
        debug!("order list has no playable pattern");
        false
    }

    fn restart_allowed(&mut self) -> bool {
        let p = &mut self.play;
        let allowed = match self.ctx.config.repeat {
            Repeat::Never => false,
            Repeat::Times(n) => p.repeats_done < n,
            Repeat::Forever => true,
        };
        if allowed {
            p.repeats_done += 1;
            debug!(repeats = p.repeats_done, "song restarted");
        }
        allowed
    }

    pub(crate) fn pattern_rows(&self, pattern: u8) -> u16 {
        self.song.patterns.get(pattern as usize).map_or(0, |p| p.rows)
    }
}
