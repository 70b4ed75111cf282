// Unit tests for domain models

use super::*;
use crate::error::ErrorKind;

#[test]
fn test_codec_from_ordinal() {
    assert_eq!(ExportCodec::from_ordinal(0), Some(ExportCodec::CinemaDng));
    assert_eq!(ExportCodec::from_ordinal(2), Some(ExportCodec::H264));
    assert_eq!(ExportCodec::from_ordinal(10), Some(ExportCodec::AudioOnly));
    assert_eq!(ExportCodec::from_ordinal(11), None);
    assert_eq!(ExportCodec::from_ordinal(-1), None);
    assert_eq!(ExportCodec::Vp9.ordinal(), 9);
}

#[test]
fn test_codec_parse() {
    assert_eq!(ExportCodec::parse("H264").unwrap(), ExportCodec::H264);
    assert_eq!(ExportCodec::parse("hevc").unwrap(), ExportCodec::H265);
    assert_eq!(ExportCodec::parse("dng").unwrap(), ExportCodec::CinemaDng);
    assert_eq!(ExportCodec::parse(" audio ").unwrap(), ExportCodec::AudioOnly);

    let err = ExportCodec::parse("mpeg2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn test_codec_families() {
    assert!(ExportCodec::Tiff.is_image_sequence());
    assert!(ExportCodec::Jpeg2000.is_image_sequence());
    assert!(!ExportCodec::ProRes.is_image_sequence());
    assert!(ExportCodec::DnxHd.is_container());
    assert!(!ExportCodec::CinemaDng.is_container());
    assert!(!ExportCodec::AudioOnly.is_container());
}

#[test]
fn test_option_parsers() {
    assert_eq!(ProResProfile::parse("4444").unwrap(), ProResProfile::P4444);
    assert_eq!(ProResProfile::parse("xq").unwrap().profile_id(), 5);
    assert_eq!(Quality::parse("medium").unwrap(), Quality::Medium);
    assert_eq!(H265BitDepth::parse("12").unwrap(), H265BitDepth::Twelve);
    assert!(H265BitDepth::parse("9").is_err());
    assert_eq!(DnxhrProfile::parse("dnxhr_hqx").unwrap(), DnxhrProfile::Hqx);
    assert!(DnxhdProfile::parse("720p8").unwrap().is_720());
    assert_eq!(NamingScheme::parse("davinci").unwrap(), NamingScheme::EditorReel);
    assert_eq!(VideoContainer::parse("mkv").unwrap().format().muxer, "matroska");
}

#[test]
fn test_scale_algorithm_unknown_ordinal_is_bicubic() {
    assert_eq!(ScaleAlgorithm::from_ordinal(3), ScaleAlgorithm::Lanczos);
    assert_eq!(ScaleAlgorithm::from_ordinal(42), ScaleAlgorithm::Bicubic);
    assert_eq!(ScaleAlgorithm::from_ordinal(-1), ScaleAlgorithm::Bicubic);
}

#[test]
fn test_hardware_encoder_names() {
    assert_eq!(
        HardwareApi::Nvenc.encoder_name(CodecId::Hevc),
        Some("hevc_nvenc")
    );
    assert_eq!(HardwareApi::VideoToolbox.encoder_name(CodecId::Vp9), None);
    assert_eq!(
        HardwareApi::MediaCodec.encoder_name(CodecId::Vp9),
        Some("vp9_mediacodec")
    );
    assert!(is_hardware_encoder_name("h264_videotoolbox"));
    assert!(is_hardware_encoder_name("vp9_qsv"));
    assert!(!is_hardware_encoder_name("libx264"));
}

#[test]
fn test_pixel_format_hardware_equivalent() {
    assert_eq!(PixelFormat::Yuv420p.hardware_equivalent(), PixelFormat::Nv12);
    assert_eq!(PixelFormat::Yuv420p10le.hardware_equivalent(), PixelFormat::P010le);
    assert_eq!(
        PixelFormat::Yuv444p12le.hardware_equivalent(),
        PixelFormat::Yuv444p12le
    );
    assert_eq!(
        PixelFormat::Yuv420p10le.x265_params(),
        Some("output-depth=10:profile=main10")
    );
    assert_eq!(PixelFormat::Yuv420p.x265_params(), None);
}

#[test]
fn test_rational_approximation() {
    let ntsc = Rational::approximate(29.97, 100_000).unwrap();
    assert!((ntsc.as_f64() - 29.97).abs() < 1e-9);

    assert_eq!(Rational::approximate(25.0, 100_000), Some(Rational::new(25, 1)));
    assert_eq!(
        Rational::approximate(24000.0 / 1001.0, 100_000),
        Some(Rational::new(24000, 1001))
    );
    assert_eq!(Rational::approximate(0.0, 100_000), None);
    assert_eq!(Rational::approximate(-5.0, 100_000), None);
}

#[test]
fn test_rational_rescale() {
    let frame_tb = Rational::new(1, 25);
    let stream_tb = Rational::new(1, 12800);
    assert_eq!(frame_tb.rescale(1, &stream_tb), 512);
    assert_eq!(frame_tb.rescale(50, &stream_tb), 25600);
    assert_eq!(stream_tb.rescale(25600, &frame_tb), 50);
    assert_eq!(frame_tb.rescale(7, &frame_tb), 7);
}

#[test]
fn test_dimensions_to_even() {
    assert_eq!(Dimensions::new(1919, 1081).to_even(), Dimensions::new(1920, 1082));
    assert_eq!(Dimensions::new(16, 16).to_even(), Dimensions::new(16, 16));
}

#[test]
fn test_request_defaults() {
    let request = ExportRequest::new(ExportCodec::H264, "M01-1200");
    assert_eq!(request.h264_quality, Quality::High);
    assert_eq!(request.h265_bit_depth, H265BitDepth::Ten);
    assert_eq!(request.prores_profile, ProResProfile::Hq);
    assert!(request.include_audio);
    assert_eq!(request.cdng_variant, 0);
    assert!(request.validate().is_ok());
}

#[test]
fn test_request_effective_stretch() {
    let request = ExportRequest::new(ExportCodec::ProRes, "clip").with_stretch(0.0, -2.0);
    assert_eq!(request.effective_stretch(), (1.0, 1.0));

    let request = ExportRequest::new(ExportCodec::ProRes, "clip").with_stretch(1.5, 0.3333);
    assert_eq!(request.effective_stretch(), (1.5, 0.3333));
}

#[test]
fn test_request_validation() {
    let empty = ExportRequest::new(ExportCodec::Png, "  ");
    assert_eq!(empty.validate().unwrap_err().kind(), ErrorKind::InvalidParameters);

    let nested = ExportRequest::new(ExportCodec::Png, "a/b");
    assert!(nested.validate().is_err());

    let nan = ExportRequest::new(ExportCodec::Png, "clip").with_fps_override(f64::NAN);
    assert!(nan.validate().is_err());
}

#[test]
fn test_base_name_from_file() {
    assert_eq!(ExportRequest::base_name_from_file("M01-1200.MLV"), "M01-1200");
    assert_eq!(ExportRequest::base_name_from_file("/data/clips/a.b.mov"), "a.b");
    assert_eq!(ExportRequest::base_name_from_file(".hidden"), ".hidden");
    assert_eq!(ExportRequest::base_name_from_file("noext"), "noext");
}

#[test]
fn test_request_toml_roundtrip_uses_defaults() {
    let request: ExportRequest =
        toml::from_str("codec = \"h265\"\nsource_base_name = \"clip\"\nh265_bit_depth = \"twelve\"\n")
            .unwrap();
    assert_eq!(request.codec, ExportCodec::H265);
    assert_eq!(request.h265_bit_depth, H265BitDepth::Twelve);
    assert_eq!(request.h265_container, VideoContainer::Mov);
    assert!(request.include_audio);
}

#[test]
fn test_stretch_matching() {
    assert!(stretch::approximately(1.333, stretch::H_133));
    assert!(!stretch::approximately(1.32, stretch::H_133));
}
