use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use lot_occupancy::{
    AvailabilityReport, BoundingBox, Detection, DetectionResult, DetectionSession, EngineSettings,
    Frame, FrameRead, FrameSource, LoopMode, ObjectClass, ObjectDetector, ParkingStatus,
    SessionExit, ZoneDefinition, ZoneId,
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 32;
const FPS: f64 = 30.0;

/// Empty lot; a textured "car" appears over the first space at `arrive_at`.
struct ArrivalSource {
    frames: u64,
    arrive_at: u64,
    car: BoundingBox,
    next: u64,
    last: Option<u64>,
}

impl ArrivalSource {
    fn render(&self, index: u64) -> Vec<u8> {
        let mut pixels = vec![110u8; (WIDTH * HEIGHT * 3) as usize];
        if index >= self.arrive_at {
            let car = self.car;
            for y in car.y as u32..car.y as u32 + car.height {
                for x in car.x as u32..car.x as u32 + car.width {
                    let level = if (x / 4 + y / 4) % 2 == 0 { 20 } else { 230 };
                    let offset = ((y * WIDTH + x) * 3) as usize;
                    pixels[offset..offset + 3].fill(level);
                }
            }
        }
        pixels
    }
}

impl FrameSource for ArrivalSource {
    fn describe(&self) -> String {
        "arrival".to_string()
    }

    fn seek(&mut self, frame_offset: u64) -> Result<()> {
        self.next = frame_offset;
        self.last = None;
        Ok(())
    }

    fn read_next(&mut self) -> FrameRead {
        if self.next >= self.frames {
            return FrameRead::EndOfStream;
        }
        let index = self.next;
        self.next += 1;
        self.last = Some(index);
        match Frame::from_rgb(self.render(index), WIDTH, HEIGHT, index) {
            Ok(frame) => FrameRead::Frame(frame),
            Err(e) => FrameRead::Failed(e.to_string()),
        }
    }

    fn position_secs(&self) -> f64 {
        self.last.map(|index| index as f64 / FPS).unwrap_or(0.0)
    }
}

/// Reports a car whenever the crop is not a single flat colour.
struct ContrastDetector;

impl ObjectDetector for ContrastDetector {
    fn name(&self) -> &'static str {
        "contrast"
    }

    fn detect(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionResult> {
        let flat = pixels.windows(2).all(|pair| pair[0] == pair[1]);
        let detections = if flat {
            Vec::new()
        } else {
            vec![Detection {
                x: 0.0,
                y: 0.0,
                w: 1.0,
                h: 1.0,
                confidence: 0.8,
                class: ObjectClass::Car,
            }]
        };
        Ok(DetectionResult { detections })
    }
}

fn spaces() -> Vec<ZoneDefinition> {
    vec![
        ZoneDefinition {
            id: ZoneId::Name("A1".to_string()),
            coordinates: vec![[0, 0], [31, 0], [31, 31], [0, 31]],
        },
        ZoneDefinition {
            id: ZoneId::Name("A2".to_string()),
            coordinates: vec![[32, 0], [63, 0], [63, 31], [32, 31]],
        },
    ]
}

#[test]
fn car_arrival_is_committed_after_the_delay() {
    let source = ArrivalSource {
        frames: 300,
        arrive_at: 150,
        car: BoundingBox {
            x: 4,
            y: 4,
            width: 24,
            height: 24,
        },
        next: 0,
        last: None,
    };
    let seen: Arc<Mutex<Vec<Vec<ParkingStatus>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let session = DetectionSession::new(
        "lot-arrival",
        &spaces(),
        Box::new(source),
        0,
        Box::new(ContrastDetector),
        EngineSettings {
            frame_pause: Duration::ZERO,
            ..EngineSettings::default()
        },
        LoopMode::OneShot,
    )
    .expect("session")
    .with_observer(Box::new(move |statuses: &[ParkingStatus]| {
        sink.lock().unwrap().push(statuses.to_vec());
    }));
    let board = session.status_board();

    assert_eq!(session.run().expect("run"), SessionExit::EndOfStream);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 100);

    // Frame 150 is the 51st processed frame (index 50); nothing may commit
    // until a full second of playback after the first occupied sample.
    let first_occupied = seen
        .iter()
        .position(|statuses| statuses[0] == ParkingStatus::Occupied)
        .expect("space A1 becomes occupied");
    assert!(first_occupied >= 50 + 10, "committed too early at {first_occupied}");
    assert!(first_occupied <= 50 + 11, "committed too late at {first_occupied}");

    let first_free = seen
        .iter()
        .position(|statuses| statuses[0] == ParkingStatus::Free)
        .expect("space A1 starts free");
    assert!(first_free <= 11);
    assert!(seen[first_free..first_occupied]
        .iter()
        .all(|statuses| statuses[0] == ParkingStatus::Free));
    assert!(seen[first_occupied..]
        .iter()
        .all(|statuses| statuses[0] == ParkingStatus::Occupied));

    let last = board.latest().expect("published statuses");
    assert_eq!(&*last, &[ParkingStatus::Occupied, ParkingStatus::Free]);
    let report = AvailabilityReport::from_statuses(&last);
    assert_eq!(report.available_spaces, 1);
    assert_eq!(report.occupied_spaces, 1);
    assert_eq!(report.total, 2);
}

#[test]
fn invalid_zone_geometry_is_rejected_before_running() {
    let source = ArrivalSource {
        frames: 30,
        arrive_at: 0,
        car: BoundingBox {
            x: 0,
            y: 0,
            width: 8,
            height: 8,
        },
        next: 0,
        last: None,
    };
    let zones = vec![ZoneDefinition {
        id: ZoneId::Index(3),
        coordinates: vec![[0, 0], [10, 10]],
    }];
    let result = DetectionSession::new(
        "lot-bad",
        &zones,
        Box::new(source),
        0,
        Box::new(ContrastDetector),
        EngineSettings::default(),
        LoopMode::OneShot,
    );
    assert!(matches!(
        result,
        Err(lot_occupancy::OccupancyError::Configuration(_))
    ));
}
