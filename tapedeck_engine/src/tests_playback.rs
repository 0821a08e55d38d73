#[cfg(test)]
mod tests {
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use tapedeck_shared::{DecodeError, RENDER_QUANTUM};

    use crate::assets::tests::wav_bytes;
    use crate::{
        EngineConfig, EngineContext, EngineError, EngineEvent, HostClock, PlaybackEngine, Renderer,
        TransportState,
    };

    const SR: u32 = 48_000;
    const QUANTUM_SECS: f64 = RENDER_QUANTUM as f64 / SR as f64;

    fn engine_with(config: EngineConfig) -> (PlaybackEngine, Renderer) {
        let ctx = EngineContext::new(SR, config).unwrap();
        PlaybackEngine::new(&ctx).unwrap()
    }

    fn engine() -> (PlaybackEngine, Renderer) {
        engine_with(EngineConfig::default())
    }

    fn sine_wav(freq: f32, seconds: f32, sample_rate: u32) -> Vec<u8> {
        let frames = (seconds * sample_rate as f32) as usize;
        let samples: Vec<f32> = (0..frames)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        wav_bytes(&samples, 1, sample_rate)
    }

    fn loaded(seconds: f32) -> (PlaybackEngine, Renderer) {
        let (mut engine, renderer) = engine();
        engine.load_asset(&sine_wav(440.0, seconds, SR)).unwrap();
        (engine, renderer)
    }

    fn ended_counter(engine: &mut PlaybackEngine) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        engine.on_ended(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn play_without_asset_fails() {
        let (mut engine, _renderer) = engine();
        assert!(matches!(engine.play(0.0), Err(EngineError::NoAssetLoaded)));
        assert_eq!(engine.state(), TransportState::Stopped);
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut engine, mut renderer) = engine();
        engine.stop();
        engine.stop();

        engine.load_asset(&sine_wav(440.0, 1.0, SR)).unwrap();
        engine.play(0.0).unwrap();
        renderer.run_quanta(10);
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), TransportState::Stopped);
        assert_eq!(engine.current_position(), 0.0);
    }

    #[test]
    fn position_is_continuous_across_rate_changes() {
        let (mut engine, mut renderer) = loaded(10.0);
        engine.play(0.0).unwrap();

        let rates = [1.0f32, 2.0, 0.5, 4.0, 0.25, 1.5];
        let mut previous = engine.current_position();
        for (i, &rate) in rates.iter().cycle().take(60).enumerate() {
            if i % 7 == 0 {
                let before = engine.current_position();
                engine.set_playback_rate(rate);
                assert_abs_diff_eq!(engine.current_position(), before, epsilon = 1e-9);
            }
            renderer.run_quanta(5);
            let now = engine.current_position();
            assert!(now >= previous, "position went backwards at step {i}");
            // never more than the fastest rate allows
            assert!(now - previous <= 4.0 * 5.0 * QUANTUM_SECS + 1e-9);
            previous = now;
        }
    }

    #[test]
    fn pause_and_resume_matches_uninterrupted_playback() {
        let (mut paused, mut paused_renderer) = loaded(5.0);
        let (mut straight, mut straight_renderer) = loaded(5.0);

        paused.play(0.0).unwrap();
        straight.play(0.0).unwrap();

        paused_renderer.run_quanta(200);
        paused.pause();
        assert_eq!(paused.state(), TransportState::Paused);
        let held = paused.current_position();
        paused.play(held).unwrap();
        paused_renderer.run_quanta(200);

        straight_renderer.run_quanta(400);
        assert_abs_diff_eq!(
            paused.current_position(),
            straight.current_position(),
            epsilon = QUANTUM_SECS
        );
    }

    #[test]
    fn position_holds_while_paused() {
        let (mut engine, mut renderer) = loaded(5.0);
        engine.play(1.0).unwrap();
        renderer.run_quanta(100);
        engine.pause();
        let held = engine.current_position();
        renderer.run_quanta(100);
        assert_eq!(engine.current_position(), held);
        assert!(held > 1.0);
    }

    #[test]
    fn natural_end_fires_once_and_rewinds() {
        let (mut engine, mut renderer) = loaded(0.05);
        let ended = ended_counter(&mut engine);

        let session = engine.play(0.0).unwrap();
        renderer.run_quanta(40);

        assert_eq!(engine.poll_events(), vec![EngineEvent::Ended { session }]);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state(), TransportState::Stopped);
        assert_eq!(engine.current_position(), 0.0);

        renderer.run_quanta(40);
        assert!(engine.poll_events().is_empty());
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn superseded_completion_is_suppressed() {
        let (mut engine, mut renderer) = loaded(0.05);
        let ended = ended_counter(&mut engine);

        let first = engine.play(0.0).unwrap();
        renderer.run_quanta(40);
        // the first source has ended but nobody has polled yet
        let second = engine.play(0.0).unwrap();
        assert_ne!(first, second);

        assert!(engine.poll_events().is_empty());
        assert_eq!(ended.load(Ordering::SeqCst), 0);
        assert!(engine.is_playing());

        renderer.run_quanta(40);
        assert_eq!(engine.poll_events(), vec![EngineEvent::Ended { session: second }]);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pause_never_reports_an_end() {
        let (mut engine, mut renderer) = loaded(0.05);
        let ended = ended_counter(&mut engine);
        engine.play(0.0).unwrap();
        renderer.run_quanta(2);
        engine.pause();
        renderer.run_quanta(40);
        assert!(engine.poll_events().is_empty());
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn seek_while_playing_restarts_at_offset() {
        let (mut engine, mut renderer) = loaded(5.0);
        let first = engine.play(0.0).unwrap();
        renderer.run_quanta(50);
        engine.seek(3.0).unwrap();
        assert!(engine.is_playing());
        assert_ne!(engine.session(), Some(first));
        assert_abs_diff_eq!(engine.current_position(), 3.0, epsilon = 1e-9);
        renderer.run_quanta(10);
        assert_abs_diff_eq!(engine.current_position(), 3.0 + 10.0 * QUANTUM_SECS, epsilon = 1e-9);
    }

    #[test]
    fn seek_while_stopped_sets_resume_point() {
        let (mut engine, _renderer) = loaded(5.0);
        engine.seek(2.5).unwrap();
        assert!(!engine.is_playing());
        assert_eq!(engine.current_position(), 2.5);
        engine.seek(99.0).unwrap();
        assert_eq!(engine.current_position(), 5.0);
    }

    #[test]
    fn loading_stops_playback() {
        let (mut engine, mut renderer) = loaded(2.0);
        engine.play(0.5).unwrap();
        renderer.run_quanta(20);
        engine.load_asset(&sine_wav(220.0, 1.0, SR)).unwrap();
        assert_eq!(engine.state(), TransportState::Stopped);
        assert_eq!(engine.current_position(), 0.0);
        assert_abs_diff_eq!(engine.duration(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn failed_load_keeps_previous_asset() {
        let (mut engine, _renderer) = loaded(2.0);
        let err = engine.load_asset(b"RIFF....nope").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert_abs_diff_eq!(engine.duration(), 2.0, epsilon = 1e-6);
        assert!(engine.play(0.0).is_ok());
    }

    #[test]
    fn foreign_rate_asset_is_resampled() {
        let (mut engine, _renderer) = engine();
        let asset = engine.load_asset(&sine_wav(440.0, 1.0, 44_100)).unwrap();
        assert_eq!(asset.sample_rate, SR);
        assert_abs_diff_eq!(engine.duration(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn setters_report_applied_values() {
        let (mut engine, _renderer) = engine();
        assert_eq!(engine.set_gain(0.5), 0.5);
        assert_eq!(engine.set_gain(-1.0), 0.0);
        assert_eq!(engine.set_filter_cutoff(0.0), 10.0);
        assert!(engine.set_filter_cutoff(1.0e6) < SR as f32 / 2.0);
        assert_eq!(engine.set_playback_rate(9.0), 4.0);
        assert_abs_diff_eq!(engine.set_pitch_shift_semitones(12.0), 2.0, epsilon = 1e-5);
        assert_eq!(engine.set_pitch_shift_semitones(48.0), 8.0);
        assert_eq!(engine.set_pitch_shift_semitones(f32::NAN), 1.0);
    }

    #[test]
    fn pitch_stage_toggles_while_playing() {
        let (mut engine, mut renderer) = loaded(2.0);
        engine.set_pitch_shift_semitones(7.0);
        engine.play(0.0).unwrap();

        for enabled in [false, true, false, true] {
            engine.set_pitch_enabled(enabled).unwrap();
            assert_eq!(engine.pitch_enabled(), enabled);
            let mut out = vec![0.0f32; RENDER_QUANTUM * 8];
            renderer.render_mono(&mut out);
            assert!(out.iter().all(|s| s.is_finite()));
            engine.poll_events();
        }
    }

    #[test]
    fn analyser_follows_rendered_output() {
        let config = EngineConfig { pitch_enabled: false, ..Default::default() };
        let (mut engine, mut renderer) = engine_with(config);
        engine.load_asset(&sine_wav(440.0, 2.0, SR)).unwrap();
        engine.play(0.0).unwrap();

        renderer.run_quanta(32);
        let analyser = engine.analyser_mut();
        assert_eq!(analyser.poll(), 32 * RENDER_QUANTUM);
        assert!(analyser.latest_quantum().iter().any(|s| s.abs() > 0.1));
        let peak = analyser.peak_frequency().unwrap();
        assert!((peak - 440.0).abs() < analyser.bin_frequency(1), "peak {peak}");

        engine.stop();
        renderer.run_quanta(64);
        let analyser = engine.analyser_mut();
        analyser.poll();
        assert!(analyser.latest_quantum().iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn renderer_serves_odd_buffer_sizes() {
        let (mut engine, mut renderer) = loaded(1.0);
        engine.play(0.0).unwrap();
        let mut out = vec![0.0f32; 100];
        renderer.render_mono(&mut out);
        // one quantum rendered, 28 samples still buffered
        assert_abs_diff_eq!(engine.now(), QUANTUM_SECS, epsilon = 1e-12);
        renderer.render_mono(&mut out);
        assert_abs_diff_eq!(engine.now(), 2.0 * QUANTUM_SECS, epsilon = 1e-12);

        let mut stereo = vec![0.0f32; 2 * RENDER_QUANTUM];
        renderer.render_interleaved(&mut stereo, 2);
        assert!(stereo.chunks(2).all(|f| f[0] == f[1]));
    }

    #[test]
    fn suspended_clock_resumes_on_play() {
        let config = EngineConfig { start_suspended: true, ..Default::default() };
        let ctx = EngineContext::new(SR, config).unwrap();
        let (mut engine, mut renderer) = PlaybackEngine::new(&ctx).unwrap();
        engine.load_asset(&sine_wav(440.0, 1.0, SR)).unwrap();

        let mut out = vec![1.0f32; RENDER_QUANTUM];
        renderer.render_mono(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.now(), 0.0);
        assert!(ctx.clock().is_suspended());

        engine.play(0.0).unwrap();
        assert!(!ctx.clock().is_suspended());
        renderer.run_quanta(4);
        assert_abs_diff_eq!(engine.now(), 4.0 * QUANTUM_SECS, epsilon = 1e-12);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig { grain_size: 0, ..Default::default() };
        assert!(matches!(EngineContext::new(SR, config), Err(EngineError::InvalidConfig(_))));
        assert!(EngineContext::new(0, EngineConfig::default()).is_err());
    }

    #[test]
    fn host_clock_is_the_engine_clock() {
        let ctx = EngineContext::new(SR, EngineConfig::default()).unwrap();
        let (engine, mut renderer) = PlaybackEngine::new(&ctx).unwrap();
        renderer.run_quanta(3);
        assert_eq!(ctx.clock().now(), engine.now());
    }
}
