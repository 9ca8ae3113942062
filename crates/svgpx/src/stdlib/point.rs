//! `Point` constructor and methods (spec §4.6 `MethodCall`, §4.8).

use crate::{
    ast::Loc,
    error::{CompileError, ErrorKind, Result},
    value::{Point, Value},
};

fn type_error(receiver: &str, member: &str, loc: Loc) -> CompileError {
    CompileError::new(ErrorKind::TypeError, format!("`{receiver}` has no method `{member}`"), loc)
}

pub fn construct(args: &[Value], loc: Loc) -> Result<Value> {
    if args.len() != 2 {
        return Err(CompileError::new(ErrorKind::ArgumentError, format!("`Point` expects 2 arguments, got {}", args.len()), loc));
    }
    let x = as_number(&args[0], loc)?;
    let y = as_number(&args[1], loc)?;
    Ok(Value::Point(Point::new(x, y)))
}

fn as_number(v: &Value, loc: Loc) -> Result<f64> {
    match v {
        Value::Number(n, _) => Ok(*n),
        other => Err(CompileError::new(ErrorKind::TypeError, format!("expected a number, got {}", other.kind_name()), loc)),
    }
}

fn as_point(v: &Value, loc: Loc) -> Result<Point> {
    match v {
        Value::Point(p) => Ok(*p),
        other => Err(CompileError::new(ErrorKind::TypeError, format!("expected a Point, got {}", other.kind_name()), loc)),
    }
}

pub fn property(p: Point, name: &str, loc: Loc) -> Result<Value> {
    match name {
        "x" => Ok(Value::number(p.x)),
        "y" => Ok(Value::number(p.y)),
        other => Err(type_error("Point", other, loc)),
    }
}

pub fn method(p: Point, name: &str, args: &[Value], loc: Loc) -> Result<Value> {
    match name {
        "translate" => {
            let (dx, dy) = (as_number(arg(args, 0, name, loc)?, loc)?, as_number(arg(args, 1, name, loc)?, loc)?);
            Ok(Value::Point(Point::new(p.x + dx, p.y + dy)))
        }
        "polarTranslate" => {
            let (angle, dist) = (as_number(arg(args, 0, name, loc)?, loc)?, as_number(arg(args, 1, name, loc)?, loc)?);
            Ok(Value::Point(Point::new(p.x + dist * angle.cos(), p.y + dist * angle.sin())))
        }
        "midpoint" => {
            let o = as_point(arg(args, 0, name, loc)?, loc)?;
            Ok(Value::Point(Point::new((p.x + o.x) / 2.0, (p.y + o.y) / 2.0)))
        }
        "lerp" => {
            let o = as_point(arg(args, 0, name, loc)?, loc)?;
            let t = as_number(arg(args, 1, name, loc)?, loc)?;
            Ok(Value::Point(Point::new(p.x + (o.x - p.x) * t, p.y + (o.y - p.y) * t)))
        }
        "rotate" => {
            let angle = as_number(arg(args, 0, name, loc)?, loc)?;
            let origin = match args.get(1) {
                Some(v) => as_point(v, loc)?,
                None => Point::new(0.0, 0.0),
            };
            let (sin, cos) = angle.sin_cos();
            let (dx, dy) = (p.x - origin.x, p.y - origin.y);
            Ok(Value::Point(Point::new(origin.x + dx * cos - dy * sin, origin.y + dx * sin + dy * cos)))
        }
        "distanceTo" => {
            let o = as_point(arg(args, 0, name, loc)?, loc)?;
            Ok(Value::number((p.x - o.x).hypot(p.y - o.y)))
        }
        "angleTo" => {
            let o = as_point(arg(args, 0, name, loc)?, loc)?;
            Ok(Value::number((o.y - p.y).atan2(o.x - p.x)))
        }
        other => Err(type_error("Point", other, loc)),
    }
}

fn arg<'a>(args: &'a [Value], i: usize, name: &str, loc: Loc) -> Result<&'a Value> {
    args.get(i).ok_or_else(|| CompileError::new(ErrorKind::ArgumentError, format!("`{name}` missing argument {}", i + 1), loc))
}
