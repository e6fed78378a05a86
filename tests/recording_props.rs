//! Property-based tests for the local archive sink
//!
//! Run with: cargo test --test recording_props --features recording

#[cfg(feature = "recording")]
mod archive_tests {
    use image::{Rgb, RgbImage};
    use proptest::prelude::*;
    use tempfile::tempdir;

    use sentrycam::audio::AudioChunk;
    use sentrycam::config::SentryConfig;
    use sentrycam::recording::{H264Encoder, Mp4Sink, RecordingSink, StreamSettings};
    use sentrycam::testing::synthetic_frame;

    fn settings_for(path: &std::path::Path, width: u32, height: u32) -> StreamSettings {
        let mut config = SentryConfig::default();
        config.camera.width = width;
        config.camera.height = height;
        config.recording.destination = path.to_string_lossy().into_owned();
        StreamSettings::from_config(&config)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// INVARIANT: even dimensions are accepted, odd ones rejected
        #[test]
        fn encoder_requires_even_dimensions(
            width in 1u32..200,
            height in 1u32..200,
        ) {
            let result = H264Encoder::new(width * 2, height * 2);
            prop_assert!(result.is_ok());
            prop_assert!(H264Encoder::new(width * 2 + 1, height * 2).is_err());
        }

        /// INVARIANT: the first frame is an Annex B keyframe
        #[test]
        fn first_frame_is_annex_b_keyframe(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
            let mut encoder = H264Encoder::new(320, 240).unwrap();
            let frame = RgbImage::from_pixel(320, 240, Rgb([r, g, b]));

            let (data, keyframe) = encoder.encode(&frame).unwrap();
            prop_assert!(keyframe, "first frame must be a keyframe");
            prop_assert!(
                data.starts_with(&[0, 0, 0, 1]) || data.starts_with(&[0, 0, 1]),
                "missing start code: {:02x?}",
                &data[..data.len().min(8)]
            );
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        /// INVARIANT: out-of-order timestamps never fail the recording
        #[test]
        fn stale_timestamps_are_dropped(pts in prop::collection::vec(0u64..2_000_000, 1..12)) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("props.mp4");
            let sink = Mp4Sink::new();
            sink.start(&settings_for(&path, 160, 120)).unwrap();

            for (i, pts_us) in pts.iter().enumerate() {
                prop_assert!(sink
                    .submit_video_frame(&synthetic_frame(i as u64, 160, 120), *pts_us)
                    .is_ok());
            }
            prop_assert!(sink.stop().is_ok());
            prop_assert!(path.exists());
        }
    }

    #[test]
    fn archive_starts_with_ftyp_and_keeps_audio() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let sink = Mp4Sink::new();
        sink.start(&settings_for(&path, 320, 240)).unwrap();

        for i in 0..25u64 {
            sink.submit_video_frame(&synthetic_frame(i, 320, 240), i * 40_000)
                .unwrap();
        }
        let chunk = AudioChunk::new(44_100, 2, vec![0; 2 * 441]);
        sink.submit_audio_samples(&chunk).unwrap();
        sink.stop().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[4..8], b"ftyp");

        let pcm = std::fs::read(Mp4Sink::audio_path(&path)).unwrap();
        assert_eq!(pcm.len(), 2 * 441 * 2);
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let sink = Mp4Sink::new();
        assert!(sink.stop().is_ok());
        assert!(sink.stop().is_ok());
    }
}
