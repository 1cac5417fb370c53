//! Enumeration of the capture modes supported by a camera.

use std::cmp::Ordering;
use std::fmt;

use log::{debug, info, warn};

use crate::device::DevicePort;
use crate::ioctl::{FmtDesc, FrameInterval, FrameSize};
use crate::PixelFormat;

/// One combination of resolution, frame rate and pixel format a camera can capture with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    /// Frames per second, rounded down.
    pub frame_rate: u32,
    /// Description of the pixel format as reported by the driver, e.g. "Motion-JPEG".
    pub pixel_format_name: String,
    pub pixel_format: PixelFormat,
}

impl VideoMode {
    /// Preference of this mode's pixel format, lower is better.
    pub fn format_rank(&self) -> u8 {
        format_rank(self.pixel_format, &self.pixel_format_name)
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{}@{} {} ({})",
            self.width, self.height, self.frame_rate, self.pixel_format, self.pixel_format_name
        )
    }
}

/// Preference of a pixel format: H.264 first, then YUYV, then any other format, and Motion-JPEG
/// last. Formats are recognized by code or by the description drivers give them.
pub fn format_rank(pixel_format: PixelFormat, name: &str) -> u8 {
    match (pixel_format, name) {
        (PixelFormat::H264, _) | (_, "H.264") => 1,
        (PixelFormat::YUYV, _) | (_, "YUYV 4:2:2") => 2,
        (PixelFormat::MJPEG, _) | (_, "Motion-JPEG") => 4,
        _ => 3,
    }
}

fn compare(a: &VideoMode, b: &VideoMode) -> Ordering {
    b.width
        .cmp(&a.width)
        .then(b.height.cmp(&a.height))
        .then(b.frame_rate.cmp(&a.frame_rate))
        .then(a.format_rank().cmp(&b.format_rank()))
}

/// Sort `modes` from the largest resolution and frame rate down, preferred formats first among
/// otherwise equal modes. Equal modes keep their relative order.
pub fn sort_video_modes(modes: &mut [VideoMode]) {
    modes.sort_by(compare);
}

/// Walk the formats of `port`, their discrete frame sizes and the discrete frame intervals of
/// each size. Any enumeration error ends the level it happened at.
fn formats(port: &dyn DevicePort) -> Vec<FmtDesc> {
    let mut formats = Vec::new();
    for index in 0.. {
        match port.enum_fmt(index) {
            Ok(desc) => formats.push(desc),
            Err(e) => {
                if !e.is_end_of_enumeration() {
                    warn!("Format enumeration stopped at index {}: {}", index, e);
                }
                break;
            }
        }
    }
    formats
}

fn frame_sizes(port: &dyn DevicePort, pixel_format: PixelFormat) -> Vec<(u32, u32)> {
    let mut sizes = Vec::new();
    for index in 0.. {
        match port.enum_frame_sizes(index, pixel_format) {
            Ok(FrameSize::Discrete { width, height }) => sizes.push((width, height)),
            Ok(size) => debug!("Skipping non-discrete frame size {:?} of {}", size, pixel_format),
            Err(e) => {
                if !e.is_end_of_enumeration() {
                    warn!(
                        "Frame size enumeration of {} stopped at index {}: {}",
                        pixel_format, index, e
                    );
                }
                break;
            }
        }
    }
    sizes
}

fn frame_rates(port: &dyn DevicePort, pixel_format: PixelFormat, width: u32, height: u32) -> Vec<u32> {
    let mut rates = Vec::new();
    for index in 0.. {
        match port.enum_frame_intervals(index, pixel_format, width, height) {
            Ok(FrameInterval::Discrete(interval)) => match interval.frame_rate() {
                Some(rate) => rates.push(rate),
                None => warn!(
                    "Ignoring invalid frame interval {} of {} {}x{}",
                    interval, pixel_format, width, height
                ),
            },
            Ok(interval) => debug!(
                "Skipping non-discrete frame interval {:?} of {} {}x{}",
                interval, pixel_format, width, height
            ),
            Err(e) => {
                if !e.is_end_of_enumeration() {
                    warn!(
                        "Frame interval enumeration of {} {}x{} stopped at index {}: {}",
                        pixel_format, width, height, index, e
                    );
                }
                break;
            }
        }
    }
    rates
}

/// List every discrete video mode of `port`, sorted with [`sort_video_modes`].
pub fn enumerate_video_modes(port: &dyn DevicePort) -> Vec<VideoMode> {
    let mut modes = Vec::new();

    for format in formats(port) {
        debug!("Found format {}", format);
        for (width, height) in frame_sizes(port, format.pixelformat) {
            for frame_rate in frame_rates(port, format.pixelformat, width, height) {
                modes.push(VideoMode {
                    width,
                    height,
                    frame_rate,
                    pixel_format_name: format.description.clone(),
                    pixel_format: format.pixelformat,
                });
            }
        }
    }

    sort_video_modes(&mut modes);
    for mode in &modes {
        info!("Video mode: {}", mode);
    }

    modes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{self, MockPort};
    use crate::ioctl::{FrameIntervalStepwise, FrameSizeStepwise, Fraction};

    fn interval(numerator: u32, denominator: u32) -> FrameInterval {
        FrameInterval::Discrete(Fraction {
            numerator,
            denominator,
        })
    }

    fn size(width: u32, height: u32) -> FrameSize {
        FrameSize::Discrete { width, height }
    }

    fn mode(width: u32, height: u32, frame_rate: u32, fourcc: &[u8; 4], name: &str) -> VideoMode {
        VideoMode {
            width,
            height,
            frame_rate,
            pixel_format_name: name.into(),
            pixel_format: PixelFormat::from(fourcc),
        }
    }

    fn assert_sorted(modes: &[VideoMode]) {
        for pair in modes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.width > b.width
                    || (a.width == b.width && a.height > b.height)
                    || (a.width == b.width && a.height == b.height && a.frame_rate > b.frame_rate)
                    || (a.width == b.width
                        && a.height == b.height
                        && a.frame_rate == b.frame_rate
                        && a.format_rank() <= b.format_rank()),
                "{} is before {}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_format_rank() {
        assert_eq!(format_rank(PixelFormat::H264, ""), 1);
        assert_eq!(format_rank(PixelFormat::from(b"XXXX"), "H.264"), 1);
        assert_eq!(format_rank(PixelFormat::YUYV, "YUYV 4:2:2"), 2);
        assert_eq!(format_rank(PixelFormat::from(b"NV12"), "Y/CbCr 4:2:0"), 3);
        assert_eq!(format_rank(PixelFormat::MJPEG, "Motion-JPEG"), 4);
    }

    #[test]
    fn test_sort() {
        let mut modes = vec![
            mode(640, 480, 30, b"MJPG", "Motion-JPEG"),
            mode(1920, 1080, 30, b"MJPG", "Motion-JPEG"),
            mode(1920, 1080, 30, b"NV12", "Y/CbCr 4:2:0"),
            mode(1920, 1080, 60, b"MJPG", "Motion-JPEG"),
            mode(1920, 1080, 30, b"H264", "H.264"),
            mode(640, 480, 30, b"YUYV", "YUYV 4:2:2"),
            mode(1920, 1200, 5, b"YUYV", "YUYV 4:2:2"),
            mode(640, 360, 30, b"YUYV", "YUYV 4:2:2"),
        ];
        sort_video_modes(&mut modes);
        assert_sorted(&modes);

        let order: Vec<String> = modes.iter().map(|m| m.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "1920x1200@5 YUYV (YUYV 4:2:2)",
                "1920x1080@60 MJPG (Motion-JPEG)",
                "1920x1080@30 H264 (H.264)",
                "1920x1080@30 NV12 (Y/CbCr 4:2:0)",
                "1920x1080@30 MJPG (Motion-JPEG)",
                "640x480@30 YUYV (YUYV 4:2:2)",
                "640x480@30 MJPG (Motion-JPEG)",
                "640x360@30 YUYV (YUYV 4:2:2)",
            ]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let mut modes = vec![
            mode(1280, 720, 30, b"NV12", "first"),
            mode(1280, 720, 30, b"RGB3", "second"),
            mode(1280, 720, 30, b"BGR3", "third"),
        ];
        sort_video_modes(&mut modes);
        let names: Vec<&str> = modes.iter().map(|m| m.pixel_format_name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_enumerate() {
        let port = MockPort::new();
        {
            let mut state = port.state.lock().unwrap();

            let mut mjpeg = mock::format(b"MJPG", "Motion-JPEG");
            mjpeg.sizes = vec![
                (size(640, 480), vec![interval(1, 30), interval(1, 15)]),
                (size(1920, 1080), vec![interval(1, 30), interval(1001, 30000)]),
            ];

            let mut yuyv = mock::format(b"YUYV", "YUYV 4:2:2");
            let stepwise = FrameIntervalStepwise {
                min: Fraction {
                    numerator: 1,
                    denominator: 30,
                },
                max: Fraction {
                    numerator: 1,
                    denominator: 1,
                },
                step: Fraction {
                    numerator: 1,
                    denominator: 30,
                },
            };
            yuyv.sizes = vec![
                (
                    FrameSize::Continuous(FrameSizeStepwise {
                        min_width: 16,
                        max_width: 4096,
                        step_width: 1,
                        min_height: 16,
                        max_height: 2160,
                        step_height: 1,
                    }),
                    vec![],
                ),
                (
                    size(640, 480),
                    vec![
                        FrameInterval::Stepwise(stepwise),
                        interval(1, 30),
                        interval(0, 30),
                    ],
                ),
            ];

            state.formats = vec![mjpeg, yuyv];
        }

        let modes = enumerate_video_modes(&port);
        assert_sorted(&modes);
        let order: Vec<String> = modes.iter().map(|m| m.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "1920x1080@30 MJPG (Motion-JPEG)",
                "1920x1080@29 MJPG (Motion-JPEG)",
                "640x480@30 YUYV (YUYV 4:2:2)",
                "640x480@30 MJPG (Motion-JPEG)",
                "640x480@15 MJPG (Motion-JPEG)",
            ]
        );
    }

    #[test]
    fn test_enumerate_no_formats() {
        let port = MockPort::new();
        assert!(enumerate_video_modes(&port).is_empty());
    }
}
