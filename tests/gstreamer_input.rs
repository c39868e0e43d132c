// 该文件是 Jianzhen （鉴真） 项目的一部分。
// tests/gstreamer_input.rs - GStreamer 解码测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! 需要系统安装 GStreamer 及 good 插件，运行方式：
//! `cargo test --test gstreamer_input -- --ignored`

#![cfg(feature = "gstreamer_input")]

use std::{io::Write, path::Path};

use gstreamer::{self as gst, prelude::*};

use jianzhen::{
  frame::PixelOrder,
  input::{FrameSampler, GStreamerDecoder, InputError, VideoDecoder},
};

/// 用 videotestsrc 生成一段 MJPEG/AVI 测试视频
fn write_test_video(path: &Path, frames: u32) {
  gst::init().unwrap();
  let description = format!(
    "videotestsrc num-buffers={frames} ! video/x-raw,width=64,height=48,framerate=25/1 \
     ! jpegenc ! avimux ! filesink name=out"
  );
  let pipeline = gst::parse::launch(&description)
    .unwrap()
    .downcast::<gst::Pipeline>()
    .unwrap();
  pipeline
    .by_name("out")
    .unwrap()
    .set_property("location", path.to_str().unwrap());

  pipeline.set_state(gst::State::Playing).unwrap();
  let bus = pipeline.bus().unwrap();
  for message in bus.iter_timed(gst::ClockTime::from_seconds(30)) {
    match message.view() {
      gst::MessageView::Eos(..) => break,
      gst::MessageView::Error(err) => panic!("failed to write test video: {}", err.error()),
      _ => {}
    }
  }
  pipeline.set_state(gst::State::Null).unwrap();
}

#[test]
#[ignore = "requires GStreamer plugins"]
fn decodes_every_frame() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("thirty.avi");
  write_test_video(&path, 30);

  let frames: Vec<_> = GStreamerDecoder::default().decode(&path).unwrap().collect();
  assert_eq!(frames.len(), 30);
  assert_eq!(frames[0].width(), 64);
  assert_eq!(frames[0].height(), 48);
  assert_eq!(frames[0].as_hwc().len(), 64 * 48 * 3);
  assert_eq!(frames[29].index(), 29);
}

#[test]
#[ignore = "requires GStreamer plugins"]
fn sampler_over_decoder_takes_every_fifth_frame() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("thirty.avi");
  write_test_video(&path, 30);

  let decoder = GStreamerDecoder::default().with_format(PixelOrder::Bgr);
  let sampled: Vec<u64> = FrameSampler::new(
    decoder.decode(&path).unwrap(),
    std::num::NonZeroUsize::new(5).unwrap(),
  )
  .map(|f| {
    assert_eq!(f.order(), PixelOrder::Bgr);
    f.index()
  })
  .collect();
  assert_eq!(sampled, vec![0, 5, 10, 15, 20, 25]);
}

#[test]
#[ignore = "requires GStreamer plugins"]
fn dropping_early_releases_decoder() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("thirty.avi");
  write_test_video(&path, 30);

  let decoder = GStreamerDecoder::default();
  let first = decoder.decode(&path).unwrap().next().unwrap();
  assert_eq!(first.index(), 0);
  // 同一文件可以再次打开
  assert_eq!(decoder.decode(&path).unwrap().count(), 30);
}

#[test]
#[ignore = "requires GStreamer plugins"]
fn corrupt_file_cannot_be_opened() {
  let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
  file.write_all(b"this is not a video container").unwrap();
  file.flush().unwrap();

  let result = GStreamerDecoder::default().decode(file.path());
  assert!(matches!(result, Err(InputError::GStreamerInputError(_))));
}

#[test]
fn missing_file_cannot_be_opened() {
  let result = GStreamerDecoder::default().decode(Path::new("/nonexistent/clip.mp4"));
  assert!(matches!(result, Err(InputError::NotFound(_))));
}
