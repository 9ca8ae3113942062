//! Path-shape generators (spec §4.8): emit absolute path tokens into the
//! active context. Forbidden inside a `PathBlock` capture, same as a bare
//! uppercase `PathCommand` statement (spec §4.5, §4.10).

use crate::{
    ast::Loc,
    error::{CompileError, ErrorKind, Result},
    path_context::PathContext,
    value::Value,
};

fn emit(ctx: &mut PathContext, letter: char, args: &[f64], to_fixed: Option<u32>, loc: Loc) -> Result<()> {
    if ctx.in_path_block && letter.is_ascii_uppercase() {
        return Err(CompileError::new(
            ErrorKind::PathBlockRestriction,
            "absolute path commands are not allowed inside a path block",
            loc,
        ));
    }
    ctx.emit(letter, args, to_fixed);
    Ok(())
}

fn arity_error(name: &str, expected: usize, got: usize, loc: Loc) -> CompileError {
    CompileError::new(ErrorKind::ArgumentError, format!("`{name}` expects {expected} argument(s), got {got}"), loc)
}

fn expect_args<'a>(name: &str, args: &'a [Value], n: usize, loc: Loc) -> Result<Vec<f64>> {
    if args.len() != n {
        return Err(arity_error(name, n, args.len(), loc));
    }
    args.iter()
        .map(|a| match a {
            Value::Number(v, _) => Ok(*v),
            other => Err(CompileError::new(ErrorKind::TypeError, format!("`{name}` expects numeric arguments, got {}", other.kind_name()), loc)),
        })
        .collect()
}

pub fn is_shape_function(name: &str) -> bool {
    matches!(
        name,
        "circle" | "arc" | "rect" | "roundRect" | "polygon" | "star" | "line" | "quadratic" | "cubic" | "moveTo" | "lineTo" | "closePath" | "arcFromPolarOffset"
    )
}

pub fn call(name: &str, args: &[Value], ctx: &mut PathContext, to_fixed: Option<u32>, loc: Loc) -> Result<Value> {
    match name {
        "circle" => {
            let a = expect_args(name, args, 3, loc)?;
            let (cx, cy, r) = (a[0], a[1], a[2]);
            emit(ctx, 'M', &[cx - r, cy], to_fixed, loc)?;
            emit(ctx, 'A', &[r, r, 0.0, 1.0, 0.0, cx + r, cy], to_fixed, loc)?;
            emit(ctx, 'A', &[r, r, 0.0, 1.0, 0.0, cx - r, cy], to_fixed, loc)?;
        }
        "arc" => {
            let a = expect_args(name, args, 7, loc)?;
            emit(ctx, 'A', &a, to_fixed, loc)?;
        }
        "rect" => {
            let a = expect_args(name, args, 4, loc)?;
            let (x, y, w, h) = (a[0], a[1], a[2], a[3]);
            emit(ctx, 'M', &[x, y], to_fixed, loc)?;
            emit(ctx, 'L', &[x + w, y], to_fixed, loc)?;
            emit(ctx, 'L', &[x + w, y + h], to_fixed, loc)?;
            emit(ctx, 'L', &[x, y + h], to_fixed, loc)?;
            emit(ctx, 'Z', &[], to_fixed, loc)?;
        }
        "roundRect" => {
            let a = expect_args(name, args, 5, loc)?;
            let (x, y, w, h) = (a[0], a[1], a[2], a[3]);
            let r = a[4].min(w.min(h) / 2.0);
            emit(ctx, 'M', &[x + r, y], to_fixed, loc)?;
            emit(ctx, 'L', &[x + w - r, y], to_fixed, loc)?;
            emit(ctx, 'A', &[r, r, 0.0, 0.0, 1.0, x + w, y + r], to_fixed, loc)?;
            emit(ctx, 'L', &[x + w, y + h - r], to_fixed, loc)?;
            emit(ctx, 'A', &[r, r, 0.0, 0.0, 1.0, x + w - r, y + h], to_fixed, loc)?;
            emit(ctx, 'L', &[x + r, y + h], to_fixed, loc)?;
            emit(ctx, 'A', &[r, r, 0.0, 0.0, 1.0, x, y + h - r], to_fixed, loc)?;
            emit(ctx, 'L', &[x, y + r], to_fixed, loc)?;
            emit(ctx, 'A', &[r, r, 0.0, 0.0, 1.0, x + r, y], to_fixed, loc)?;
            emit(ctx, 'Z', &[], to_fixed, loc)?;
        }
        "polygon" => {
            let a = expect_args(name, args, 4, loc)?;
            let (cx, cy, r, n) = (a[0], a[1], a[2], a[3]);
            polygon_points(cx, cy, r, n, loc, name)?.into_iter().enumerate().try_for_each(|(i, (x, y))| {
                emit(ctx, if i == 0 { 'M' } else { 'L' }, &[x, y], to_fixed, loc)
            })?;
            emit(ctx, 'Z', &[], to_fixed, loc)?;
        }
        "star" => {
            let a = expect_args(name, args, 5, loc)?;
            let (cx, cy, r_outer, r_inner, n) = (a[0], a[1], a[2], a[3], a[4]);
            let n = require_positive_integer(n, loc, name)?;
            for i in 0..(2 * n) {
                let angle = -std::f64::consts::FRAC_PI_2 + std::f64::consts::PI * i as f64 / n as f64;
                let r = if i % 2 == 0 { r_outer } else { r_inner };
                let (x, y) = (cx + r * angle.cos(), cy + r * angle.sin());
                emit(ctx, if i == 0 { 'M' } else { 'L' }, &[x, y], to_fixed, loc)?;
            }
            emit(ctx, 'Z', &[], to_fixed, loc)?;
        }
        "line" => {
            let a = expect_args(name, args, 4, loc)?;
            emit(ctx, 'M', &[a[0], a[1]], to_fixed, loc)?;
            emit(ctx, 'L', &[a[2], a[3]], to_fixed, loc)?;
        }
        "quadratic" => {
            let a = expect_args(name, args, 6, loc)?;
            emit(ctx, 'M', &[a[0], a[1]], to_fixed, loc)?;
            emit(ctx, 'Q', &[a[2], a[3], a[4], a[5]], to_fixed, loc)?;
        }
        "cubic" => {
            let a = expect_args(name, args, 8, loc)?;
            emit(ctx, 'M', &[a[0], a[1]], to_fixed, loc)?;
            emit(ctx, 'C', &[a[2], a[3], a[4], a[5], a[6], a[7]], to_fixed, loc)?;
        }
        "moveTo" => {
            let a = expect_args(name, args, 2, loc)?;
            emit(ctx, 'M', &a, to_fixed, loc)?;
        }
        "lineTo" => {
            let a = expect_args(name, args, 2, loc)?;
            emit(ctx, 'L', &a, to_fixed, loc)?;
        }
        "closePath" => {
            expect_args(name, args, 0, loc)?;
            emit(ctx, 'Z', &[], to_fixed, loc)?;
        }
        "arcFromPolarOffset" => {
            let a = expect_args(name, args, 7, loc)?;
            let (rx, ry, x_rot, large_arc, sweep, angle, dist) = (a[0], a[1], a[2], a[3], a[4], a[5], a[6]);
            let end_x = ctx.position.x + dist * angle.cos();
            let end_y = ctx.position.y + dist * angle.sin();
            emit(ctx, 'A', &[rx, ry, x_rot, large_arc, sweep, end_x, end_y], to_fixed, loc)?;
        }
        _ => unreachable!("not a shape function: {name}"),
    }
    Ok(Value::Null)
}

fn require_positive_integer(n: f64, loc: Loc, name: &str) -> Result<u64> {
    if n < 1.0 || n.fract() != 0.0 {
        return Err(CompileError::new(ErrorKind::ArgumentError, format!("`{name}` expects a positive integer count"), loc));
    }
    Ok(n as u64)
}

fn polygon_points(cx: f64, cy: f64, r: f64, n: f64, loc: Loc, name: &str) -> Result<Vec<(f64, f64)>> {
    let n = require_positive_integer(n, loc, name)?;
    Ok((0..n)
        .map(|k| {
            let angle = std::f64::consts::TAU * k as f64 / n as f64;
            (cx + r * angle.cos(), cy + r * angle.sin())
        })
        .collect())
}
