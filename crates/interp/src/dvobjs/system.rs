//! `$SYS`: system probes
//!
//! `uname` describes the platform, `locale` reads the environment, `time`
//! is epoch seconds, and `random` draws from the thread RNG (bounded by an
//! optional numeric argument).

use super::{DvObjEntry, make_dvobj as build_dvobj};
use hvml_core::errors::{self, ErrorCode};
use hvml_variant::Variant;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

fn uname_getter(
    _root: Option<&Variant>,
    _args: &[Variant],
    _silently: bool,
) -> Result<Variant, ErrorCode> {
    let obj = Variant::object();
    obj.object_set("kernel-name", Variant::string(std::env::consts::OS))?;
    obj.object_set("machine", Variant::string(std::env::consts::ARCH))?;
    obj.object_set("family", Variant::string(std::env::consts::FAMILY))?;
    Ok(obj)
}

fn locale_getter(
    _root: Option<&Variant>,
    _args: &[Variant],
    _silently: bool,
) -> Result<Variant, ErrorCode> {
    let locale = std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .unwrap_or_else(|_| "C".to_owned());
    Ok(Variant::string(locale))
}

fn time_getter(
    _root: Option<&Variant>,
    _args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => Ok(Variant::ulongint(elapsed.as_secs())),
        Err(_) => {
            errors::set_last_error_silently(errors::BAD_SYSTEM_CALL, silently);
            Err(errors::BAD_SYSTEM_CALL)
        }
    }
}

fn random_getter(
    _root: Option<&Variant>,
    args: &[Variant],
    silently: bool,
) -> Result<Variant, ErrorCode> {
    let mut rng = rand::thread_rng();
    match args.first() {
        None => Ok(Variant::number(rng.gen_range(0.0..1.0))),
        Some(max) => match max.cast_to_f64() {
            Some(m) if m > 0.0 => Ok(Variant::number(rng.gen_range(0.0..m))),
            _ => {
                errors::set_last_error_silently(errors::WRONG_ARGS, silently);
                Err(errors::WRONG_ARGS)
            }
        },
    }
}

/// Build the `$SYS` object.
pub fn make_dvobj() -> Variant {
    build_dvobj(&[
        DvObjEntry {
            name: "uname",
            getter: uname_getter,
            setter: None,
        },
        DvObjEntry {
            name: "locale",
            getter: locale_getter,
            setter: None,
        },
        DvObjEntry {
            name: "time",
            getter: time_getter,
            setter: None,
        },
        DvObjEntry {
            name: "random",
            getter: random_getter,
            setter: None,
        },
    ])
}
