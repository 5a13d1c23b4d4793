use super::{CaptureDevice, Facing};

const REAR_KEYWORDS: &[&str] = &["back", "rear", "environment", "trasera"];
const FRONT_KEYWORDS: &[&str] = &["front", "user", "facetime", "frontal"];

/// Pick the device to open for `facing`.
///
/// Platform metadata wins, then label keywords. Without either, environment
/// falls back to the last enumerated device (phones list the rear camera
/// last), user falls back to the first, and `Any` takes the first device.
pub fn select_preferred_device(devices: &[CaptureDevice], facing: Facing) -> Option<&CaptureDevice> {
    match facing {
        Facing::Environment => find_facing(devices, Facing::Environment, REAR_KEYWORDS)
            .or_else(|| devices.last()),
        Facing::User => {
            find_facing(devices, Facing::User, FRONT_KEYWORDS).or_else(|| devices.first())
        }
        Facing::Any => devices.first(),
    }
}

fn find_facing<'a>(
    devices: &'a [CaptureDevice],
    facing: Facing,
    keywords: &[&str],
) -> Option<&'a CaptureDevice> {
    devices
        .iter()
        .find(|device| device.facing == Some(facing))
        .or_else(|| devices.iter().find(|device| label_matches(&device.label, keywords)))
}

fn label_matches(label: &str, keywords: &[&str]) -> bool {
    let label = label.to_lowercase();
    keywords.iter().any(|keyword| label.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(labels: &[&str]) -> Vec<CaptureDevice> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| CaptureDevice::new(format!("cam-{i}"), *label))
            .collect()
    }

    #[test]
    fn rear_label_is_preferred() {
        let list = devices(&["Front Camera", "Back Camera", "USB Cam"]);
        let chosen = select_preferred_device(&list, Facing::Environment).unwrap();
        assert_eq!(chosen.id, "cam-1");
    }

    #[test]
    fn label_match_is_case_insensitive() {
        let list = devices(&["camera2 0, facing ENVIRONMENT", "camera2 1, facing front"]);
        assert_eq!(select_preferred_device(&list, Facing::Environment).unwrap().id, "cam-0");
        assert_eq!(select_preferred_device(&list, Facing::User).unwrap().id, "cam-1");
    }

    #[test]
    fn unlabeled_devices_fall_back_to_last_for_environment() {
        let list = devices(&["", "", ""]);
        assert_eq!(select_preferred_device(&list, Facing::Environment).unwrap().id, "cam-2");
        assert_eq!(select_preferred_device(&list, Facing::User).unwrap().id, "cam-0");
        assert_eq!(select_preferred_device(&list, Facing::Any).unwrap().id, "cam-0");
    }

    #[test]
    fn metadata_beats_labels() {
        let list = vec![
            CaptureDevice::new("a", "Back Camera"),
            CaptureDevice::new("b", "").with_facing(Facing::Environment),
        ];
        assert_eq!(select_preferred_device(&list, Facing::Environment).unwrap().id, "b");
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert!(select_preferred_device(&[], Facing::Environment).is_none());
        assert!(select_preferred_device(&[], Facing::Any).is_none());
    }
}
