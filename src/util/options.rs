use crate::util::constants::*;
use std::default::Default;
use std::fmt;
use std::str::FromStr;

/// The split of the heap between belts, in belt (address) order, as whole percentages.
///
/// The format is a comma separated list, e.g. `70,30`. Every entry must be positive and
/// the entries must add up to 100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeltPercentages(pub Vec<u8>);

impl BeltPercentages {
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.iter().all(|p| *p > 0)
            && self.0.iter().map(|p| *p as u32).sum::<u32>() == 100
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Default for BeltPercentages {
    fn default() -> Self {
        BeltPercentages(DEFAULT_BELT_PERCENTAGES.to_vec())
    }
}

impl FromStr for BeltPercentages {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(|p| {
                p.trim()
                    .parse::<u8>()
                    .map_err(|e| format!("Failed to parse belt percentage {:?}: {}", p, e))
            })
            .collect::<Result<Vec<u8>, String>>()
            .map(BeltPercentages)
    }
}

impl fmt::Display for BeltPercentages {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($name: $type[$validator] = $default),*);
    ];
    ($($name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        #[derive(Debug, Clone)]
        pub struct Options {
            $(pub $name: $type),*
        }
        impl Options {
            /// Set an option from its snake case name and a string value. Returns false,
            /// leaving the option untouched, if the name is unknown or the value cannot be
            /// parsed or fails validation.
            pub fn set_from_str(&mut self, s: &str, val: &str)->bool {
                match s {
                    // Parse the given value from str (by env vars or by calling set_from_str()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("unknown option {}", s);
                        false
                    }
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options {
                    $($name: $default),*
                };

                // If we have env vars that start with BELTWAY_ and match any option (such as BELTWAY_MAX_HEAP_SIZE),
                // we set the option to its value (if it is a valid value). Otherwise, use the default value.
                const PREFIX: &str = "BELTWAY_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                return options;
            }
        }
    ]
}
options! {
    // Maximum heap size in bytes, split between the belts. This needs to be set before creating a Beltway instance.
    max_heap_size:           usize           [|v: &usize| *v >= MIN_HEAP_SIZE] = DEFAULT_MAX_HEAP_SIZE,
    // Percentage of the heap given to each belt, lowest address first.
    belt_percentages:        BeltPercentages [|v: &BeltPercentages| v.is_valid()] = BeltPercentages::default(),
    // log2 of the card size of the remembered set. A card may not be larger than a page.
    log_bytes_in_card:       usize           [|v: &usize| (MIN_LOG_BYTES_IN_CARD..=LOG_BYTES_IN_PAGE as usize).contains(v)] = DEFAULT_LOG_BYTES_IN_CARD,
    // Can the mature belt grow into an empty neighbour once the heap runs out of memory?
    mature_expandable:       bool            [always_valid] = true,
    // Number of entries in the root table published to observers.
    root_table_capacity:     usize           [|v: &usize| *v > 0] = DEFAULT_ROOT_TABLE_CAPACITY,
    // Give every cached remote page its own heap buffer instead of carving pages out of the shared pool.
    no_direct_buffers:       bool            [always_valid] = false,
    // Size in bytes of the shared pool of page buffers used by the remote page cache.
    direct_buffer_pool_size: usize           [always_valid] = DEFAULT_DIRECT_BUFFER_POOL_SIZE,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::options::Options;
    use crate::util::test_util::{serial_test, with_cleanup};

    #[test]
    fn no_env_var() {
        serial_test(|| {
            let options = Options::default();
            assert_eq!(options.max_heap_size, DEFAULT_MAX_HEAP_SIZE);
            assert_eq!(options.belt_percentages.as_slice(), &[70, 30]);
            assert_eq!(options.log_bytes_in_card, 9);
            assert!(options.mature_expandable);
            assert!(!options.no_direct_buffers);
            assert_eq!(options.direct_buffer_pool_size, 100 << 20);
        })
    }

    #[test]
    fn with_valid_env_var() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("BELTWAY_MAX_HEAP_SIZE", "1048576");

                    let options = Options::default();
                    assert_eq!(options.max_heap_size, 1048576);
                },
                || {
                    std::env::remove_var("BELTWAY_MAX_HEAP_SIZE");
                },
            )
        })
    }

    #[test]
    fn with_multiple_valid_env_vars() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("BELTWAY_BELT_PERCENTAGES", "60,40");
                    std::env::set_var("BELTWAY_NO_DIRECT_BUFFERS", "true");

                    let options = Options::default();
                    assert_eq!(options.belt_percentages, BeltPercentages(vec![60, 40]));
                    assert!(options.no_direct_buffers);
                },
                || {
                    std::env::remove_var("BELTWAY_BELT_PERCENTAGES");
                    std::env::remove_var("BELTWAY_NO_DIRECT_BUFFERS");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_value() {
        serial_test(|| {
            with_cleanup(
                || {
                    // invalid value, we cannot parse the value, so use the default value
                    std::env::set_var("BELTWAY_DIRECT_BUFFER_POOL_SIZE", "lots");

                    let options = Options::default();
                    assert_eq!(
                        options.direct_buffer_pool_size,
                        DEFAULT_DIRECT_BUFFER_POOL_SIZE
                    );
                },
                || {
                    std::env::remove_var("BELTWAY_DIRECT_BUFFER_POOL_SIZE");
                },
            )
        })
    }

    #[test]
    fn with_percentages_not_adding_up() {
        serial_test(|| {
            with_cleanup(
                || {
                    // parses, but fails validation
                    std::env::set_var("BELTWAY_BELT_PERCENTAGES", "60,30");

                    let options = Options::default();
                    assert_eq!(options.belt_percentages, BeltPercentages::default());
                },
                || {
                    std::env::remove_var("BELTWAY_BELT_PERCENTAGES");
                },
            )
        })
    }

    #[test]
    fn with_invalid_env_var_key() {
        serial_test(|| {
            with_cleanup(
                || {
                    std::env::set_var("BELTWAY_ABC", "42");

                    let options = Options::default();
                    assert_eq!(options.max_heap_size, DEFAULT_MAX_HEAP_SIZE);
                },
                || {
                    std::env::remove_var("BELTWAY_ABC");
                },
            )
        })
    }

    #[test]
    fn set_from_str_validates() {
        serial_test(|| {
            let mut options = Options::default();
            assert!(options.set_from_str("log_bytes_in_card", "10"));
            assert_eq!(options.log_bytes_in_card, 10);
            // Larger than a page.
            assert!(!options.set_from_str("log_bytes_in_card", "13"));
            assert_eq!(options.log_bytes_in_card, 10);
            assert!(!options.set_from_str("no_such_option", "1"));
        })
    }

    #[test]
    fn belt_percentages_format() {
        let p: BeltPercentages = " 25, 25,50".parse().unwrap();
        assert!(p.is_valid());
        assert_eq!(p.to_string(), "25,25,50");
        assert!("70,x".parse::<BeltPercentages>().is_err());
        assert!(!BeltPercentages(vec![100, 0]).is_valid());
        assert!(!BeltPercentages(vec![]).is_valid());
    }
}
