//! Per-frame orchestration of the gaze-to-action chain.
//!
//! [`GazePipeline`] owns every stateful component and runs one frame at a
//! time: safety bookkeeping, then either the calibration wizard or cursor
//! tracking plus expression classification, debouncing, dispatch and the
//! final safety check. It performs no I/O; the worker delivers what it
//! returns.

use gazectl_common::{AppConfig, CalibrationError, GazeError, GazeResult};
use gazectl_frame_model::{
    ActionCommand, ActionKind, CalibrationProfile, GazeVector, LandmarkFrame, PipelineState,
    Point2D, TelemetryUpdate, TimestampMs,
};
use gazectl_processing_core::{
    estimate_gaze, ActionDispatcher, ActionTable, CalibrationWizard, CursorSmoother, DebounceGate,
    ExpressionEngine, ExpressionOutcome, GazeMapper, SafetyManager, SafetyState, SafetyStatus,
    WizardStatus,
};

/// What happened to a calibration run on this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    Progress(WizardStatus),
    /// The new profile is installed; persist it if needed.
    Completed(CalibrationProfile),
    /// The run was rejected and the previous profile (if any) kept.
    Failed(CalibrationError),
}

/// Result of processing one frame.
#[derive(Debug)]
pub struct FrameOutcome {
    pub frame_id: u64,
    pub timestamp_ms: TimestampMs,
    /// Face present, confident and well-formed.
    pub face_detected: bool,
    /// Filtered cursor position after this frame.
    pub cursor: Option<Point2D>,
    pub state: PipelineState,
    /// Authorized commands, in delivery order.
    pub commands: Vec<ActionCommand>,
    /// Reasons for commands the safety gate refused.
    pub rejections: Vec<String>,
    /// Safety transition caused by this frame.
    pub transition: Option<SafetyState>,
    pub calibration: Option<CalibrationEvent>,
    /// Recoverable error for this frame; the frame was skipped.
    pub error: Option<GazeError>,
}

impl FrameOutcome {
    fn new(frame: &LandmarkFrame, state: PipelineState) -> Self {
        Self {
            frame_id: frame.frame_id,
            timestamp_ms: frame.timestamp_ms,
            face_detected: false,
            cursor: None,
            state,
            commands: Vec::new(),
            rejections: Vec::new(),
            transition: None,
            calibration: None,
            error: None,
        }
    }

    /// Whether this outcome must reach the UI even when telemetry is
    /// throttled.
    pub fn is_notable(&self) -> bool {
        self.transition.is_some()
            || !self.rejections.is_empty()
            || matches!(
                self.calibration,
                Some(CalibrationEvent::Completed(_) | CalibrationEvent::Failed(_))
            )
    }

    pub fn telemetry(&self, latency_us: u64, dropped_frames: u64) -> TelemetryUpdate {
        TelemetryUpdate {
            timestamp_ms: self.timestamp_ms,
            frame_id: Some(self.frame_id),
            cursor: self.cursor,
            face_detected: self.face_detected,
            state: self.state,
            latency_us,
            dropped_frames,
            rejections: self.rejections.clone(),
        }
    }
}

#[derive(Debug)]
enum Mode {
    Running,
    Calibrating(Box<CalibrationWizard>),
}

/// The processing chain for one user session.
#[derive(Debug)]
pub struct GazePipeline {
    config: AppConfig,
    mapper: GazeMapper,
    smoother: CursorSmoother,
    expressions: ExpressionEngine,
    gate: DebounceGate,
    safety: SafetyManager,
    dispatcher: ActionDispatcher,
    mode: Mode,
    /// Cleared by `toggle_mode`: gestures still fire but the cursor stays put.
    pointer_enabled: bool,
    last_timestamp_ms: Option<TimestampMs>,
    last_pointer: Option<Point2D>,
    last_face: bool,
}

impl GazePipeline {
    /// Build a pipeline from a validated configuration, uncalibrated.
    pub fn new(config: AppConfig) -> GazeResult<Self> {
        config.validate()?;
        let screen = config.screen;
        Ok(Self {
            mapper: GazeMapper::new(screen),
            smoother: CursorSmoother::from_config(&config.gaze, screen),
            expressions: ExpressionEngine::new(config.expressions.clone()),
            gate: DebounceGate::from_config(&config.expressions),
            safety: SafetyManager::new(&config.safety),
            dispatcher: ActionDispatcher::new(
                ActionTable::from_config(&config.actions),
                config.safety.scroll_lines,
            ),
            mode: Mode::Running,
            pointer_enabled: true,
            last_timestamp_ms: None,
            last_pointer: None,
            last_face: false,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        match self.mode {
            Mode::Calibrating(_) => PipelineState::Calibrating,
            Mode::Running if self.safety.is_active() => PipelineState::Active,
            Mode::Running => PipelineState::Paused,
        }
    }

    pub fn safety_state(&self) -> SafetyState {
        self.safety.state()
    }

    pub fn safety_status(&mut self, now_ms: TimestampMs) -> SafetyStatus {
        self.safety.status(now_ms)
    }

    pub fn is_calibrated(&self) -> bool {
        self.mapper.is_calibrated()
    }

    pub fn profile(&self) -> Option<&CalibrationProfile> {
        self.mapper.profile()
    }

    pub fn pointer_enabled(&self) -> bool {
        self.pointer_enabled
    }

    /// Current filtered cursor position.
    pub fn cursor(&self) -> Option<Point2D> {
        self.smoother.state().map(|s| s.position)
    }

    /// Install a calibration profile and restart cursor filtering from it.
    pub fn install_profile(&mut self, profile: CalibrationProfile) -> GazeResult<()> {
        self.mapper.install(profile)?;
        self.smoother.reset();
        self.last_pointer = None;
        Ok(())
    }

    /// Enter the calibration wizard. Dispatch is suspended until it ends.
    pub fn begin_calibration(&mut self) {
        tracing::info!(
            points = self.config.calibration.points,
            "Calibration started"
        );
        self.mode = Mode::Calibrating(Box::new(CalibrationWizard::new(
            &self.config.calibration,
            self.config.screen,
        )));
        self.gate.reset();
    }

    /// Abandon a calibration run. Returns whether one was in progress.
    pub fn cancel_calibration(&mut self) -> bool {
        if matches!(self.mode, Mode::Calibrating(_)) {
            tracing::info!("Calibration cancelled");
            self.mode = Mode::Running;
            return true;
        }
        false
    }

    /// Current wizard target, while calibrating.
    pub fn calibration_target(&self) -> Option<Point2D> {
        match &self.mode {
            Mode::Calibrating(wizard) => wizard.current_target(),
            Mode::Running => None,
        }
    }

    /// Stop all output immediately. Only [`resume`](Self::resume) lifts it.
    pub fn emergency_stop(&mut self) -> Option<SafetyState> {
        self.cancel_calibration();
        self.safety.emergency_stop()
    }

    pub fn resume(&mut self) -> Option<SafetyState> {
        self.gate.reset();
        self.safety.resume()
    }

    /// Advance timers when no frame arrived.
    pub fn tick(&mut self, now_ms: TimestampMs) -> Option<SafetyState> {
        self.safety.check_timeout(now_ms)
    }

    /// Telemetry snapshot outside of frame processing.
    pub fn snapshot(
        &self,
        now_ms: TimestampMs,
        latency_us: u64,
        dropped_frames: u64,
    ) -> TelemetryUpdate {
        TelemetryUpdate {
            timestamp_ms: now_ms,
            frame_id: None,
            cursor: self.cursor(),
            face_detected: self.last_face,
            state: self.state(),
            latency_us,
            dropped_frames,
            rejections: Vec::new(),
        }
    }

    /// Run the full chain for one frame.
    pub fn process_frame(&mut self, frame: &LandmarkFrame) -> FrameOutcome {
        let ts = frame.timestamp_ms;
        let mut outcome = FrameOutcome::new(frame, self.state());
        outcome.cursor = self.cursor();

        if let Some(last) = self.last_timestamp_ms {
            if ts <= last {
                outcome.error = Some(GazeError::input(format!(
                    "frame {} at {ts} ms is not after {last} ms",
                    frame.frame_id
                )));
                return outcome;
            }
        }
        self.last_timestamp_ms = Some(ts);

        let well_formed = match frame.validate() {
            Ok(()) => true,
            Err(message) => {
                tracing::debug!(frame_id = frame.frame_id, %message, "Malformed frame skipped");
                outcome.error = Some(GazeError::input(message));
                false
            }
        };
        let valid = well_formed && self.expressions.is_stable(frame);
        self.last_face = valid;
        outcome.face_detected = valid;
        outcome.transition = self.safety.observe_frame(valid, ts);

        if matches!(self.mode, Mode::Calibrating(_)) {
            let gaze = if valid {
                estimate_gaze(frame, self.config.gaze.eye_dominance)
            } else {
                None
            };
            outcome.calibration = self.step_calibration(gaze, ts);
            outcome.cursor = self.cursor();
            outcome.state = self.state();
            return outcome;
        }

        outcome.state = self.state();
        if !self.safety.is_active() || !well_formed {
            return outcome;
        }

        if valid && self.pointer_enabled {
            if let Some(command) = self.track_cursor(frame) {
                self.authorize_into(command, ts, &mut outcome);
            }
            outcome.cursor = self.cursor();
        }

        match self.expressions.process(frame) {
            ExpressionOutcome::Classified(raw) => {
                let cursor = self.cursor();
                for mut event in self.gate.process(&raw, ts) {
                    event.cursor = cursor;
                    tracing::debug!(
                        channel = %event.channel,
                        intensity = event.intensity,
                        frame_id = event.frame_id,
                        "Gesture confirmed"
                    );
                    if let Some(command) = self.dispatcher.dispatch(&event) {
                        self.authorize_into(command, ts, &mut outcome);
                    }
                }
            }
            ExpressionOutcome::Baseline { .. } | ExpressionOutcome::Suppressed => {}
        }

        outcome
    }

    fn track_cursor(&mut self, frame: &LandmarkFrame) -> Option<ActionCommand> {
        if !self.mapper.is_calibrated() {
            return None;
        }
        let gaze = estimate_gaze(frame, self.config.gaze.eye_dominance)?;
        let sample = match self.mapper.map(&gaze, frame.timestamp_ms) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::debug!(error = %e, "Gaze sample rejected");
                return None;
            }
        };
        let state = self.smoother.update(sample);
        if self.last_pointer == Some(state.position) {
            return None;
        }
        self.last_pointer = Some(state.position);
        Some(self.dispatcher.pointer_move(&state))
    }

    fn authorize_into(
        &mut self,
        command: ActionCommand,
        now_ms: TimestampMs,
        outcome: &mut FrameOutcome,
    ) {
        match self.safety.authorize(command.kind, now_ms) {
            Ok(()) => {
                if command.kind == ActionKind::ToggleMode {
                    self.pointer_enabled = !self.pointer_enabled;
                    tracing::info!(pointer_enabled = self.pointer_enabled, "Pointer mode toggled");
                }
                outcome.commands.push(command);
            }
            Err(violation) => {
                tracing::debug!(action = command.kind.as_str(), %violation, "Action rejected");
                outcome
                    .rejections
                    .push(format!("{}: {violation}", command.kind.as_str()));
            }
        }
    }

    fn step_calibration(
        &mut self,
        gaze: Option<GazeVector>,
        now_ms: TimestampMs,
    ) -> Option<CalibrationEvent> {
        let Mode::Calibrating(wizard) = &mut self.mode else {
            return None;
        };
        let fitted = match wizard.observe(gaze, now_ms) {
            Ok(WizardStatus::ReadyToFit) => wizard.finish(),
            Ok(status) => return Some(CalibrationEvent::Progress(status)),
            Err(e) => Err(e),
        };
        self.mode = Mode::Running;
        self.gate.reset();

        let result = fitted.and_then(|profile| {
            self.install_profile(profile.clone())
                .map(|()| profile)
                .map_err(|e| CalibrationError::Degenerate {
                    message: e.to_string(),
                })
        });
        match result {
            Ok(profile) => {
                tracing::info!(
                    anchors = profile.anchors.len(),
                    residual_px = profile.residual_px,
                    "Calibration complete"
                );
                Some(CalibrationEvent::Completed(profile))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Calibration rejected, keeping previous profile");
                Some(CalibrationEvent::Failed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazectl_frame_model::synthetic::SyntheticFace;
    use gazectl_frame_model::{ActionPayload, RegressionModel, ScreenSize, PROFILE_VERSION};
    use gazectl_processing_core::PauseReason;

    const FRAME_MS: u64 = 33;

    /// Maps the synthetic gaze range straight onto a 1920x1080 screen.
    fn linear_profile() -> CalibrationProfile {
        CalibrationProfile {
            version: PROFILE_VERSION.to_string(),
            screen: ScreenSize::new(1920, 1080),
            model: RegressionModel::Affine,
            anchors: vec![],
            coefficients_x: vec![960.0, 1200.0, 0.0],
            coefficients_y: vec![540.0, 0.0, 900.0],
            residual_px: 0.0,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn pipeline() -> GazePipeline {
        GazePipeline::new(AppConfig::default()).unwrap()
    }

    /// Feed `faces` one frame apart starting at `start`; returns all outcomes.
    fn run(
        p: &mut GazePipeline,
        faces: &[SyntheticFace],
        start: &mut u64,
    ) -> Vec<FrameOutcome> {
        faces
            .iter()
            .map(|face| {
                let id = *start;
                *start += 1;
                p.process_frame(&face.frame(id, id * FRAME_MS))
            })
            .collect()
    }

    fn commands(outcomes: &[FrameOutcome]) -> Vec<ActionCommand> {
        outcomes.iter().flat_map(|o| o.commands.clone()).collect()
    }

    fn blink() -> Vec<SyntheticFace> {
        let shut = SyntheticFace::neutral().eyes(0.0, 0.0);
        vec![shut.clone(), shut, SyntheticFace::neutral()]
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.gaze.smoothing_factor = 1.5;
        assert!(matches!(
            GazePipeline::new(config),
            Err(GazeError::Config { .. })
        ));
    }

    #[test]
    fn test_blink_clicks_at_cursor() {
        let mut p = pipeline();
        p.install_profile(linear_profile()).unwrap();
        let mut id = 0;
        let open = SyntheticFace::neutral().gaze(0.2, -0.1);
        run(&mut p, &vec![open.clone(); 40], &mut id);
        let cursor = p.cursor().unwrap();

        let shut = open.clone().eyes(0.0, 0.0);
        let outcomes = run(&mut p, &[shut.clone(), shut, open], &mut id);
        let clicks: Vec<_> = commands(&outcomes)
            .into_iter()
            .filter(|c| c.kind == ActionKind::LeftClick)
            .collect();
        assert_eq!(clicks.len(), 1);
        let at = clicks[0].position().unwrap();
        assert!(at.distance_to(&cursor) < 1.0);
    }

    #[test]
    fn test_uncalibrated_pipeline_still_dispatches_gestures() {
        let mut p = pipeline();
        let mut id = 0;
        let mut script = vec![SyntheticFace::neutral(); 30];
        script.extend(blink());
        let cmds = commands(&run(&mut p, &script, &mut id));
        assert!(cmds.iter().all(|c| c.kind != ActionKind::PointerMove));
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].payload, ActionPayload::None);
    }

    #[test]
    fn test_out_of_order_frame_is_skipped() {
        let mut p = pipeline();
        p.process_frame(&SyntheticFace::neutral().frame(10, 1000));
        let outcome = p.process_frame(&SyntheticFace::neutral().frame(9, 900));
        assert!(matches!(outcome.error, Some(GazeError::Input { .. })));
        assert!(outcome.commands.is_empty());

        let repeated = p.process_frame(&SyntheticFace::neutral().frame(11, 1000));
        assert!(matches!(repeated.error, Some(GazeError::Input { .. })));
        let next = p.process_frame(&SyntheticFace::neutral().frame(12, 1033));
        assert!(next.error.is_none());
    }

    #[test]
    fn test_frame_gap_pauses_before_gestures() {
        let mut p = pipeline();
        let mut id = 0;
        run(&mut p, &vec![SyntheticFace::neutral(); 40], &mut id);

        // The stream resumes 3 s later with a blink already in progress.
        id += 3000 / FRAME_MS;
        let outcomes = run(&mut p, &blink(), &mut id);
        assert_eq!(
            outcomes[0].transition,
            Some(SafetyState::Paused(PauseReason::NoFace))
        );
        assert!(outcomes.iter().all(|o| o.state == PipelineState::Paused));
        assert!(commands(&outcomes).is_empty());

        // Two more stable frames complete the resume streak.
        let back = run(&mut p, &vec![SyntheticFace::neutral(); 2], &mut id);
        assert_eq!(back[1].transition, Some(SafetyState::Active));
        let outcomes = run(&mut p, &blink(), &mut id);
        assert_eq!(
            commands(&outcomes)
                .iter()
                .filter(|c| c.kind == ActionKind::LeftClick)
                .count(),
            1
        );
    }

    #[test]
    fn test_malformed_frame_holds_cursor() {
        let mut p = pipeline();
        p.install_profile(linear_profile()).unwrap();
        let mut id = 0;
        run(&mut p, &vec![SyntheticFace::neutral(); 5], &mut id);
        let held = p.cursor();

        let mut bad = SyntheticFace::neutral().gaze(0.5, 0.5).frame(id, id * FRAME_MS);
        bad.landmarks.truncate(100);
        let outcome = p.process_frame(&bad);
        assert!(matches!(outcome.error, Some(GazeError::Input { .. })));
        assert!(!outcome.face_detected);
        assert_eq!(outcome.cursor, held);
        assert!(outcome.commands.is_empty());
    }

    #[test]
    fn test_no_face_pauses_then_resumes() {
        let mut p = pipeline();
        let mut id = 0;
        run(&mut p, &[SyntheticFace::neutral()], &mut id);
        let gone = SyntheticFace::neutral().confidence(0.0);
        let outcomes = run(&mut p, &vec![gone; 62], &mut id);
        let paused_at = outcomes
            .iter()
            .position(|o| o.transition.is_some())
            .unwrap();
        assert_eq!(
            outcomes[paused_at].transition,
            Some(SafetyState::Paused(PauseReason::NoFace))
        );
        assert_eq!(outcomes[paused_at].state, PipelineState::Paused);

        let back = run(&mut p, &vec![SyntheticFace::neutral(); 5], &mut id);
        assert_eq!(back[3].state, PipelineState::Paused);
        assert_eq!(back[4].transition, Some(SafetyState::Active));
        assert_eq!(back[4].state, PipelineState::Active);
    }

    #[test]
    fn test_tick_pauses_without_frames() {
        let mut p = pipeline();
        p.process_frame(&SyntheticFace::neutral().frame(0, 0));
        assert_eq!(p.tick(1500), None);
        assert_eq!(
            p.tick(2001),
            Some(SafetyState::Paused(PauseReason::NoFace))
        );
        assert_eq!(p.snapshot(2001, 0, 0).state, PipelineState::Paused);
    }

    #[test]
    fn test_emergency_stop_blocks_everything_until_resume() {
        let mut p = pipeline();
        p.install_profile(linear_profile()).unwrap();
        let mut id = 0;
        run(&mut p, &vec![SyntheticFace::neutral(); 30], &mut id);

        p.emergency_stop();
        let mut script = blink();
        script.extend(vec![SyntheticFace::neutral().gaze(0.4, 0.4); 10]);
        let outcomes = run(&mut p, &script, &mut id);
        assert!(commands(&outcomes).is_empty());
        assert!(outcomes.iter().all(|o| o.state == PipelineState::Paused));

        assert_eq!(p.resume(), Some(SafetyState::Active));
        let outcomes = run(&mut p, &blink(), &mut id);
        assert!(commands(&outcomes)
            .iter()
            .any(|c| c.kind == ActionKind::LeftClick));
    }

    #[test]
    fn test_confirmed_action_needs_a_repeat() {
        let mut config = AppConfig::default();
        config.safety.require_confirmation = vec![ActionKind::LeftClick];
        let mut p = GazePipeline::new(config).unwrap();
        let mut id = 0;
        run(&mut p, &vec![SyntheticFace::neutral(); 30], &mut id);

        let first = run(&mut p, &blink(), &mut id);
        assert!(commands(&first).is_empty());
        let rejections: Vec<_> = first.iter().flat_map(|o| o.rejections.clone()).collect();
        assert_eq!(rejections.len(), 1);
        assert!(rejections[0].starts_with("left_click: "));
        assert!(rejections[0].contains("needs confirmation"));

        run(&mut p, &vec![SyntheticFace::neutral(); 10], &mut id);
        let second = run(&mut p, &blink(), &mut id);
        let cmds = commands(&second);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].kind, ActionKind::LeftClick);
    }

    #[test]
    fn test_toggle_mode_freezes_pointer() {
        let mut p = pipeline();
        p.install_profile(linear_profile()).unwrap();
        let mut id = 0;
        run(&mut p, &vec![SyntheticFace::neutral(); 30], &mut id);

        let smile = SyntheticFace::neutral().smile(0.5);
        let outcomes = run(&mut p, &vec![smile; 3], &mut id);
        assert!(commands(&outcomes)
            .iter()
            .any(|c| c.kind == ActionKind::ToggleMode));
        assert!(!p.pointer_enabled());

        let frozen = p.cursor();
        let moved = run(
            &mut p,
            &vec![SyntheticFace::neutral().gaze(0.6, 0.4); 10],
            &mut id,
        );
        assert!(commands(&moved)
            .iter()
            .all(|c| c.kind != ActionKind::PointerMove));
        assert_eq!(p.cursor(), frozen);
    }

    #[test]
    fn test_calibration_is_modal_and_installs_profile() {
        let mut config = AppConfig::default();
        config.calibration.settle_ms = 66;
        config.calibration.dwell_ms = 165;
        let screen = config.screen;
        let mut p = GazePipeline::new(config).unwrap();
        p.begin_calibration();
        assert_eq!(p.state(), PipelineState::Calibrating);

        let mut id = 0;
        let mut finished = None;
        while finished.is_none() {
            let face = match p.calibration_target() {
                Some(target) => SyntheticFace::neutral().looking_at(target, screen),
                None => SyntheticFace::neutral(),
            };
            // Blinking during calibration never clicks.
            let face = if id % 7 == 3 { face.eyes(0.0, 0.0) } else { face };
            let outcome = p.process_frame(&face.frame(id, id * FRAME_MS));
            assert!(outcome.commands.is_empty());
            if let Some(CalibrationEvent::Completed(profile)) = outcome.calibration {
                finished = Some(profile);
            }
            id += 1;
            assert!(id < 2000, "calibration never completed");
        }

        assert_eq!(p.state(), PipelineState::Active);
        assert!(p.is_calibrated());
        assert_eq!(p.profile(), finished.as_ref());
    }

    #[test]
    fn test_failed_calibration_keeps_previous_profile() {
        let mut config = AppConfig::default();
        config.calibration.settle_ms = 0;
        config.calibration.dwell_ms = 66;
        let mut p = GazePipeline::new(config).unwrap();
        p.install_profile(linear_profile()).unwrap();
        p.begin_calibration();

        // Face never visible: the first anchor has no samples.
        let mut outcome = None;
        for id in 0..10 {
            let o = p.process_frame(&LandmarkFrame::no_face(id, id * FRAME_MS));
            if matches!(o.calibration, Some(CalibrationEvent::Failed(_))) {
                outcome = Some(o);
                break;
            }
        }
        let outcome = outcome.unwrap();
        assert!(matches!(
            outcome.calibration,
            Some(CalibrationEvent::Failed(CalibrationError::NoSamples { anchor: 0 }))
        ));
        assert!(outcome.is_notable());
        assert_eq!(p.profile(), Some(&linear_profile()));
        assert_ne!(p.state(), PipelineState::Calibrating);
    }
}
