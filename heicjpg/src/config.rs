use std::{fs, path::PathBuf};

/// Longest side, in pixels, an output image may have
pub const DEFAULT_MAX_SIDE: u32 = 1600;
/// Size budget for one output file (1024 KB)
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    /// Quality of the first encode attempt
    pub start: u8,
    /// Lowest quality tried; its result is kept even when over budget
    pub floor: u8,
    /// Decrement between attempts
    pub step: u8,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            start: 95,
            floor: 30,
            step: 5,
        }
    }
}

impl QualityPolicy {
    /// Qualities to try, highest first. Always ends at exactly `floor`.
    pub fn attempts(&self) -> impl Iterator<Item = u8> {
        let floor = self.floor.min(self.start);
        let step = self.step.max(1) as usize;

        (floor..=self.start)
            .rev()
            .step_by(step)
            .chain(std::iter::once(floor))
            .scan(None, move |last, q| {
                // the chained floor repeats when the descent lands on it
                if *last == Some(floor) {
                    return None;
                }
                *last = Some(q);
                Some(q)
            })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub max_side: u32,
    pub max_bytes: u64,
    pub quality: QualityPolicy,
    /// Worker count; `None` means one per logical CPU
    pub threads: Option<usize>,
    pub recursive: bool,
    pub preserve_times: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            max_side: DEFAULT_MAX_SIDE,
            max_bytes: DEFAULT_MAX_BYTES,
            quality: QualityPolicy::default(),
            threads: None,
            recursive: false,
            preserve_times: true,
        }
    }
}

impl ConvertConfig {
    pub fn load() -> Option<Self> {
        let config_path = Self::config_path()?;

        fs::read_to_string(&config_path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
    }

    pub fn save(&self) -> Option<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).ok()?;
        }

        serde_json::to_string_pretty(self)
            .ok()
            .and_then(|json| fs::write(&config_path, json).ok())
            .map(|_| config_path)
    }

    pub fn config_path() -> Option<PathBuf> {
        #[allow(deprecated)]
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("heicjpg").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_attempts_descend_to_floor() {
        let attempts: Vec<u8> = QualityPolicy::default().attempts().collect();

        assert_eq!(
            attempts,
            vec![95, 90, 85, 80, 75, 70, 65, 60, 55, 50, 45, 40, 35, 30]
        );
    }

    #[test]
    fn attempts_end_on_floor_when_step_overshoots() {
        let policy = QualityPolicy {
            start: 95,
            floor: 30,
            step: 20,
        };

        let attempts: Vec<u8> = policy.attempts().collect();
        assert_eq!(attempts, vec![95, 75, 55, 35, 30]);
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = QualityPolicy {
            start: 100,
            floor: 1,
            step: 1,
        };

        assert_eq!(policy.attempts().count(), 100);
    }

    #[test]
    fn floor_equal_to_start_is_a_single_attempt() {
        let policy = QualityPolicy {
            start: 60,
            floor: 60,
            step: 5,
        };

        assert_eq!(policy.attempts().collect::<Vec<_>>(), vec![60]);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ConvertConfig = serde_json::from_str(r#"{ "max_side": 2048 }"#).unwrap();

        assert_eq!(config.max_side, 2048);
        assert_eq!(config.max_bytes, DEFAULT_MAX_BYTES);
        assert_eq!(config.quality, QualityPolicy::default());
        assert!(config.preserve_times);
    }
}
