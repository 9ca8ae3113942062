//! Math and constants (spec §4.8).
//!
//! Grounded on the teacher's `modules/math.rs`: a closed, `strum`-derived
//! enum of function names dispatched through one `match`.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::{
    ast::Loc,
    error::{CompileError, ErrorKind, Result},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum MathFunction {
    #[strum(serialize = "sin")]
    Sin,
    #[strum(serialize = "cos")]
    Cos,
    #[strum(serialize = "tan")]
    Tan,
    #[strum(serialize = "asin")]
    Asin,
    #[strum(serialize = "acos")]
    Acos,
    #[strum(serialize = "atan")]
    Atan,
    #[strum(serialize = "atan2")]
    Atan2,
    #[strum(serialize = "sinh")]
    Sinh,
    #[strum(serialize = "cosh")]
    Cosh,
    #[strum(serialize = "tanh")]
    Tanh,
    #[strum(serialize = "exp")]
    Exp,
    /// Natural logarithm. Reachable only as `ln`, not `log` — `log` is a
    /// reserved word bound to the diagnostic `log(values…)` call (spec §4.8,
    /// §9), so the two can never share a name in this grammar.
    #[strum(serialize = "ln")]
    Log,
    #[strum(serialize = "log10")]
    Log10,
    #[strum(serialize = "log2")]
    Log2,
    #[strum(serialize = "pow")]
    Pow,
    #[strum(serialize = "sqrt")]
    Sqrt,
    #[strum(serialize = "cbrt")]
    Cbrt,
    #[strum(serialize = "floor")]
    Floor,
    #[strum(serialize = "ceil")]
    Ceil,
    #[strum(serialize = "round")]
    Round,
    #[strum(serialize = "trunc")]
    Trunc,
    #[strum(serialize = "abs")]
    Abs,
    #[strum(serialize = "sign")]
    Sign,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "max")]
    Max,
    #[strum(serialize = "lerp")]
    Lerp,
    #[strum(serialize = "clamp")]
    Clamp,
    #[strum(serialize = "map")]
    Map,
    #[strum(serialize = "deg")]
    Deg,
    #[strum(serialize = "rad")]
    Rad,
    #[strum(serialize = "random")]
    Random,
    #[strum(serialize = "randomRange")]
    RandomRange,
    #[strum(serialize = "mpi")]
    Mpi,
}

pub fn is_math_function(name: &str) -> bool {
    MathFunction::from_str(name).is_ok() || matches!(name, "PI" | "E" | "TAU")
}

pub fn constant(name: &str) -> Option<f64> {
    match name {
        "PI" => Some(std::f64::consts::PI),
        "E" => Some(std::f64::consts::E),
        "TAU" => Some(std::f64::consts::TAU),
        _ => None,
    }
}

fn arg_error(loc: Loc, name: &str, expected: usize, got: usize) -> CompileError {
    CompileError::new(ErrorKind::ArgumentError, format!("`{name}` expects {expected} argument(s), got {got}"), loc)
}

fn num(args: &[Value], i: usize, name: &str, loc: Loc) -> Result<f64> {
    match args.get(i) {
        Some(Value::Number(v, _)) => Ok(*v),
        Some(other) => Err(CompileError::new(ErrorKind::TypeError, format!("`{name}` expects a number argument, got {}", other.kind_name()), loc)),
        None => Err(arg_error(loc, name, i + 1, args.len())),
    }
}

pub fn call(func: MathFunction, args: &[Value], rng: &mut rand_chacha::ChaCha8Rng, loc: Loc) -> Result<Value> {
    use rand::Rng;
    let name = func.to_string();
    let v = |i: usize| num(args, i, &name, loc);
    let r = match func {
        MathFunction::Sin => v(0)?.sin(),
        MathFunction::Cos => v(0)?.cos(),
        MathFunction::Tan => v(0)?.tan(),
        MathFunction::Asin => v(0)?.asin(),
        MathFunction::Acos => v(0)?.acos(),
        MathFunction::Atan => v(0)?.atan(),
        MathFunction::Atan2 => v(0)?.atan2(v(1)?),
        MathFunction::Sinh => v(0)?.sinh(),
        MathFunction::Cosh => v(0)?.cosh(),
        MathFunction::Tanh => v(0)?.tanh(),
        MathFunction::Exp => v(0)?.exp(),
        MathFunction::Log => v(0)?.ln(),
        MathFunction::Log10 => v(0)?.log10(),
        MathFunction::Log2 => v(0)?.log2(),
        MathFunction::Pow => v(0)?.powf(v(1)?),
        MathFunction::Sqrt => v(0)?.sqrt(),
        MathFunction::Cbrt => v(0)?.cbrt(),
        MathFunction::Floor => v(0)?.floor(),
        MathFunction::Ceil => v(0)?.ceil(),
        MathFunction::Round => v(0)?.round(),
        MathFunction::Trunc => v(0)?.trunc(),
        MathFunction::Abs => v(0)?.abs(),
        MathFunction::Sign => v(0)?.signum() * if v(0)? == 0.0 { 0.0 } else { 1.0 },
        MathFunction::Min => v(0)?.min(v(1)?),
        MathFunction::Max => v(0)?.max(v(1)?),
        MathFunction::Lerp => {
            let (a, b, t) = (v(0)?, v(1)?, v(2)?);
            a + (b - a) * t
        }
        MathFunction::Clamp => {
            let (x, lo, hi) = (v(0)?, v(1)?, v(2)?);
            x.clamp(lo.min(hi), lo.max(hi))
        }
        MathFunction::Map => {
            let (x, in_min, in_max, out_min, out_max) = (v(0)?, v(1)?, v(2)?, v(3)?, v(4)?);
            out_min + (x - in_min) * (out_max - out_min) / (in_max - in_min)
        }
        MathFunction::Deg => v(0)?.to_degrees(),
        MathFunction::Rad => v(0)?.to_radians(),
        MathFunction::Random => rng.r#gen::<f64>(),
        MathFunction::RandomRange => {
            let (lo, hi) = (v(0)?, v(1)?);
            rng.gen_range(lo..=hi)
        }
        MathFunction::Mpi => v(0)? * std::f64::consts::PI,
    };
    Ok(Value::number(r))
}
