use bevy::prelude::*;

use crate::game::simulation::wrap_angle;

/// Detects when a tank has stopped making progress. A single baseline of
/// position and heading is captured whenever the tank moves far enough; if
/// the timer runs out without such a move the detector trips, and it clears
/// again once the tank has rotated far enough away from that same baseline
/// heading.
#[derive(Component, Debug, Clone)]
pub struct StuckDetector {
    pub timeout: f32,
    pub timer: f32,
    pub is_stuck: bool,
    pub last_position: Vec2,
    pub last_heading: f32,
}

impl StuckDetector {
    pub fn new(timeout: f32, position: Vec2, heading: f32) -> Self {
        Self {
            timeout,
            timer: 0.0,
            is_stuck: false,
            last_position: position,
            last_heading: heading,
        }
    }

    pub fn tick(
        &mut self,
        position: Vec2,
        heading: f32,
        dt: f32,
        displacement_threshold: f32,
        exit_angle: f32,
    ) {
        if position.distance(self.last_position) >= displacement_threshold {
            // Any real displacement resets the baseline, stuck or not
            self.last_position = position;
            self.last_heading = heading;
            self.timer = 0.0;
            self.is_stuck = false;
            return;
        }

        if self.is_stuck {
            if wrap_angle(heading - self.last_heading).abs() >= exit_angle {
                self.last_position = position;
                self.last_heading = heading;
                self.timer = 0.0;
                self.is_stuck = false;
            }
            return;
        }

        self.timer += dt;
        if self.timer >= self.timeout {
            self.is_stuck = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    const DT: f32 = 0.02;
    const DISPLACEMENT: f32 = 0.25;
    const EXIT: f32 = 30.0_f32.to_radians();

    // Summing 0.02_f32 a hundred times lands a hair under 2.0, so the trip
    // happens on the tick after the nominal boundary.
    fn idle_until_stuck(detector: &mut StuckDetector) {
        for _ in 0..101 {
            detector.tick(detector.last_position, detector.last_heading, DT, DISPLACEMENT, EXIT);
        }
    }

    #[test]
    fn trips_after_timeout_without_movement() {
        let mut detector = StuckDetector::new(2.0, Vec2::ZERO, 0.0);
        for _ in 0..100 {
            detector.tick(Vec2::ZERO, 0.0, DT, DISPLACEMENT, EXIT);
            assert!(!detector.is_stuck);
        }
        detector.tick(Vec2::ZERO, 0.0, DT, DISPLACEMENT, EXIT);
        assert!(detector.is_stuck);
    }

    #[test]
    fn movement_resets_the_timer() {
        let mut detector = StuckDetector::new(2.0, Vec2::ZERO, 0.0);
        for _ in 0..90 {
            detector.tick(Vec2::ZERO, 0.0, DT, DISPLACEMENT, EXIT);
        }
        detector.tick(Vec2::new(0.3, 0.0), 0.0, DT, DISPLACEMENT, EXIT);
        assert_eq!(detector.timer, 0.0);
        assert_eq!(detector.last_position, Vec2::new(0.3, 0.0));
    }

    #[test]
    fn creeping_below_threshold_still_trips() {
        // Each step is tiny but the baseline only moves on a real jump, so
        // the accumulated drift below 0.25 never resets the timer
        let mut detector = StuckDetector::new(2.0, Vec2::ZERO, 0.0);
        for i in 0..101 {
            let pos = Vec2::new(i as f32 * 0.001, 0.0);
            detector.tick(pos, 0.0, DT, DISPLACEMENT, EXIT);
        }
        assert!(detector.is_stuck);
    }

    #[test]
    fn recovers_after_turning_far_enough() {
        let mut detector = StuckDetector::new(2.0, Vec2::ZERO, 0.0);
        idle_until_stuck(&mut detector);
        assert!(detector.is_stuck);

        detector.tick(Vec2::ZERO, 0.2, DT, DISPLACEMENT, EXIT);
        assert!(detector.is_stuck, "20 degrees is not enough");
        detector.tick(Vec2::ZERO, FRAC_PI_4, DT, DISPLACEMENT, EXIT);
        assert!(!detector.is_stuck, "45 degrees clears the detector");
        assert_eq!(detector.last_heading, FRAC_PI_4);
    }

    #[test]
    fn recovery_by_displacement_while_stuck() {
        let mut detector = StuckDetector::new(2.0, Vec2::ZERO, 0.0);
        idle_until_stuck(&mut detector);
        assert!(detector.is_stuck);
        detector.tick(Vec2::new(0.5, 0.0), 0.0, DT, DISPLACEMENT, EXIT);
        assert!(!detector.is_stuck);
    }

    #[test]
    fn heading_wrap_does_not_inflate_the_change() {
        let mut detector = StuckDetector::new(2.0, Vec2::ZERO, 3.1);
        idle_until_stuck(&mut detector);
        assert!(detector.is_stuck);
        // -3.1 rad is only ~0.08 rad away from 3.1 across the wrap
        detector.tick(Vec2::ZERO, -3.1, DT, DISPLACEMENT, EXIT);
        assert!(detector.is_stuck);
    }
}
