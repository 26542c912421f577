/// Detections reported for one image region.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when any detection belongs to the vehicle class set.
    pub fn has_vehicle(&self) -> bool {
        self.detections.iter().any(|d| d.class.is_vehicle())
    }
}

/// Bounding box in normalized 0..1 coordinates of the submitted region.
#[derive(Clone, Debug)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class: ObjectClass,
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
    Other(u32),
}

impl ObjectClass {
    /// Map a COCO-80 class index (the YOLO family's label order).
    pub fn from_coco_index(index: u32) -> Self {
        match index {
            0 => ObjectClass::Person,
            1 => ObjectClass::Bicycle,
            2 => ObjectClass::Car,
            3 => ObjectClass::Motorcycle,
            5 => ObjectClass::Bus,
            7 => ObjectClass::Truck,
            other => ObjectClass::Other(other),
        }
    }

    /// Car, motorcycle, bus and truck count as vehicles.
    pub fn is_vehicle(self) -> bool {
        matches!(
            self,
            ObjectClass::Car | ObjectClass::Motorcycle | ObjectClass::Bus | ObjectClass::Truck
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class: ObjectClass) -> Detection {
        Detection {
            x: 0.1,
            y: 0.1,
            w: 0.5,
            h: 0.5,
            confidence: 0.9,
            class,
        }
    }

    #[test]
    fn vehicle_set_matches_coco_indices() {
        let vehicles: Vec<u32> = (0..80)
            .filter(|i| ObjectClass::from_coco_index(*i).is_vehicle())
            .collect();
        assert_eq!(vehicles, vec![2, 3, 5, 7]);
    }

    #[test]
    fn has_vehicle_ignores_other_categories() {
        let result = DetectionResult {
            detections: vec![
                detection(ObjectClass::Person),
                detection(ObjectClass::Bicycle),
            ],
        };
        assert!(!result.has_vehicle());

        let result = DetectionResult {
            detections: vec![detection(ObjectClass::Person), detection(ObjectClass::Truck)],
        };
        assert!(result.has_vehicle());
        assert!(!DetectionResult::empty().has_vehicle());
    }
}
