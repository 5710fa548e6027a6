//! Runtime cursor for instrument envelopes.

use tm_ir::Envelope;

/// Output range of a volume or panning envelope.
pub const VOLUME_RANGE: (i32, i32) = (0, 64);
/// Output range of a pitch, filter or panning-offset envelope.
pub const SIGNED_RANGE: (i32, i32) = (-32, 32);

/// Playback position inside one envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvelopeCursor {
    /// Current tick.
    pub position: u16,
    /// Reached the last node with no loop to follow.
    ended: bool,
}

impl EnvelopeCursor {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Value at the current position, clamped to `range`, then advance one tick.
    ///
    /// The sustain loop holds while `key_off` is false; otherwise the normal
    /// loop applies, and without one the cursor parks on the last node.
    pub fn step(&mut self, env: &Envelope, key_off: bool, range: (i32, i32)) -> i32 {
        let value = (env.value_at(self.position) as i32).clamp(range.0, range.1);
        self.advance(env, key_off);
        value
    }

    fn advance(&mut self, env: &Envelope, key_off: bool) {
        self.position = self.position.saturating_add(1);
        match (env.sustain, env.loop_range) {
            (Some(sus), _) if !key_off => {
                if self.position > env.tick_of(sus.end) {
                    self.position = env.tick_of(sus.start);
                }
            }
            (_, Some(lp)) => {
                if self.position > env.tick_of(lp.end) {
                    self.position = env.tick_of(lp.start);
                }
            }
            _ => {
                let last = env.last_tick();
                if self.position > last {
                    self.position = last;
                    self.ended = true;
                }
            }
        }
    }

    /// True once a volume envelope can only produce silence from here on.
    ///
    /// That is either parking on a final node of 0, or cycling a
    /// zero-length loop (or held sustain) whose node is 0.
    pub fn is_silent_hold(&self, env: &Envelope, key_off: bool) -> bool {
        if self.ended {
            return env.last_value() == 0;
        }
        let range = match (env.sustain, env.loop_range) {
            (Some(sus), _) if !key_off => sus,
            (_, Some(lp)) => lp,
            _ => return false,
        };
        let start = env.tick_of(range.start);
        start == env.tick_of(range.end) && env.value_at(start) == 0 && self.position >= start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tm_ir::EnvelopeRange;

    fn walk(env: &Envelope, cursor: &mut EnvelopeCursor, ticks: usize, key_off: bool) -> Vec<i32> {
        (0..ticks).map(|_| cursor.step(env, key_off, VOLUME_RANGE)).collect()
    }

    #[test]
    fn one_shot_parks_on_last_node() {
        let env = Envelope::from_points(&[(0, 64), (4, 0)]);
        let mut c = EnvelopeCursor::default();
        assert_eq!(walk(&env, &mut c, 7, false), vec![64, 48, 32, 16, 0, 0, 0]);
        assert!(c.is_ended());
        assert!(c.is_silent_hold(&env, false));
    }

    #[test]
    fn loop_wraps_from_end_to_start() {
        let mut env = Envelope::from_points(&[(0, 0), (2, 20), (4, 40)]);
        env.loop_range = Some(EnvelopeRange { start: 1, end: 2 });
        let mut c = EnvelopeCursor::default();
        assert_eq!(walk(&env, &mut c, 8, false), vec![0, 10, 20, 30, 40, 20, 30, 40]);
        assert!(!c.is_ended());
    }

    #[test]
    fn sustain_holds_until_key_off() {
        let mut env = Envelope::from_points(&[(0, 64), (2, 32), (4, 0)]);
        env.sustain = Some(EnvelopeRange { start: 1, end: 1 });
        let mut c = EnvelopeCursor::default();
        assert_eq!(walk(&env, &mut c, 5, false), vec![64, 48, 32, 32, 32]);
        assert_eq!(walk(&env, &mut c, 4, true), vec![32, 16, 0, 0]);
    }

    #[test]
    fn values_are_clamped_to_range() {
        let env = Envelope::from_points(&[(0, 100), (1, -100)]);
        let mut c = EnvelopeCursor::default();
        assert_eq!(c.step(&env, false, SIGNED_RANGE), 32);
        assert_eq!(c.step(&env, false, SIGNED_RANGE), -32);
    }

    #[test]
    fn zero_length_loop_on_zero_is_silent() {
        let mut env = Envelope::from_points(&[(0, 64), (3, 0), (6, 30)]);
        env.loop_range = Some(EnvelopeRange { start: 1, end: 1 });
        let mut c = EnvelopeCursor::default();
        walk(&env, &mut c, 6, false);
        assert_eq!(c.position, 3);
        assert!(c.is_silent_hold(&env, false));
    }

    #[test]
    fn nonzero_final_node_is_not_silent() {
        let env = Envelope::from_points(&[(0, 64), (2, 10)]);
        let mut c = EnvelopeCursor::default();
        walk(&env, &mut c, 5, false);
        assert!(c.is_ended());
        assert!(!c.is_silent_hold(&env, false));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

        #[test]
        fn two_node_envelope_is_linear(a in 0i8..=64, b in 0i8..=64, len in 1u16..200, t in 0u16..200) {
            let env = Envelope::from_points(&[(0, a), (len, b)]);
            let mut c = EnvelopeCursor::default();
            let ticks = t.min(len);
            for _ in 0..ticks {
                c.step(&env, false, VOLUME_RANGE);
            }
            let expected = a as i32 + ticks as i32 * (b as i32 - a as i32) / len as i32;
            prop_assert_eq!(c.step(&env, false, VOLUME_RANGE), expected);
        }
    }
}
