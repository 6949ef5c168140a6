//! Compiled-in configuration, overridable by the boot-option string the
//! platform layer hands to `main` (there is no filesystem mounted yet at the
//! point configuration is read, so there is nothing else to read it from).

use log::LevelFilter;

/// Keyboard layouts a concrete platform binding's scancode-to-ASCII table
/// can select between. `RawKey.unicode` already arrives decoded by the
/// firmware's Simple Text Input protocol by the time it reaches N's
/// `keymap::translate`, so this value has no effect inside this crate — it
/// exists for a real `PlatformServices` impl to read at start-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardLayout {
    Qwerty,
    Qwertz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub log_level: LevelFilter,
    pub keyboard_layout: KeyboardLayout,
    /// Number of spaces the editor's Tab key inserts.
    pub tab_width: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            keyboard_layout: KeyboardLayout::Qwertz,
            tab_width: 4,
        }
    }
}

impl Config {
    /// Parse a `key=value,key=value` boot-option string over the compiled-in
    /// defaults. Unknown keys and malformed values are ignored rather than
    /// rejected outright — a typo in a boot option should not prevent the
    /// workstation from booting at all.
    pub fn from_boot_options(s: &str) -> Self {
        let mut cfg = Self::default();
        for pair in s.split(',') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key.trim() {
                "log" => {
                    if let Some(level) = parse_level(value.trim()) {
                        cfg.log_level = level;
                    }
                }
                "kbd" => match value.trim() {
                    "qwerty" => cfg.keyboard_layout = KeyboardLayout::Qwerty,
                    "qwertz" => cfg.keyboard_layout = KeyboardLayout::Qwertz,
                    _ => {}
                },
                "tabwidth" => {
                    if let Ok(n) = value.trim().parse::<u8>() {
                        if n > 0 && n <= 16 {
                            cfg.tab_width = n;
                        }
                    }
                }
                _ => {}
            }
        }
        cfg
    }
}

fn parse_level(s: &str) -> Option<LevelFilter> {
    Some(match s.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let cfg = Config::from_boot_options("");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn overrides_known_keys() {
        let cfg = Config::from_boot_options("log=debug,kbd=qwerty,tabwidth=2");
        assert_eq!(cfg.log_level, LevelFilter::Debug);
        assert_eq!(cfg.keyboard_layout, KeyboardLayout::Qwerty);
        assert_eq!(cfg.tab_width, 2);
    }

    #[test]
    fn ignores_garbage() {
        let cfg = Config::from_boot_options("nonsense;log=bogus,tabwidth=999");
        assert_eq!(cfg, Config::default());
    }
}
