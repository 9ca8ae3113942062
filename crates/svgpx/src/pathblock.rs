//! `PathBlock` capture and parametric geometry (spec §4.10).
//!
//! Every segment kind is reduced to a flattened polyline of absolute points
//! with a cumulative arc-length table; `get`/`tangent`/`normal`/`partition`
//! all sample that one table. This trades a little precision on curves and
//! arcs for a single code path across all seven segment kinds — the spec
//! explicitly allows an "acceptable approximation for sampling" on arcs, and
//! the same tolerance is assumed for cubic/quadratic flattening.

use crate::{
    error::{CompileError, ErrorKind, Result},
    path_context::{LastControl, PathContext},
    value::Point,
};

const FLATTEN_STEPS: usize = 24;

#[derive(Debug, Clone)]
pub struct SubPathCommand {
    pub command: char,
    pub args: Vec<f64>,
    pub start: Point,
    pub end: Point,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    len: f64,
    point: Point,
    angle: f64,
}

#[derive(Debug)]
pub struct PathBlockData {
    pub tokens: Vec<String>,
    pub start_point: Point,
    pub end_point: Point,
    pub vertices: Vec<Point>,
    pub sub_path_count: usize,
    pub sub_path_commands: Vec<SubPathCommand>,
    pub length: f64,
    samples: Vec<Sample>,
}

struct Sampled {
    point: Point,
    angle: f64,
}

impl PathBlockData {
    pub fn from_context(ctx: &PathContext) -> Self {
        let mut pos = Point::new(0.0, 0.0);
        let mut subpath_start = pos;
        let mut last_control: Option<LastControl> = None;
        let mut vertices = vec![pos];
        let mut sub_path_commands = Vec::new();
        let mut sub_path_count = 0usize;
        let mut samples = vec![Sample { len: 0.0, point: pos, angle: 0.0 }];
        let mut cum_len = 0.0f64;

        for (letter, args) in &ctx.commands {
            let start = pos;
            let points: Vec<Point>;
            let end: Point;
            match *letter {
                'm' => {
                    end = Point::new(start.x + args[0], start.y + args[1]);
                    points = Vec::new();
                    sub_path_count += 1;
                }
                'l' => {
                    end = Point::new(start.x + args[0], start.y + args[1]);
                    points = vec![end];
                }
                'h' => {
                    end = Point::new(start.x + args[0], start.y);
                    points = vec![end];
                }
                'v' => {
                    end = Point::new(start.x, start.y + args[0]);
                    points = vec![end];
                }
                'c' => {
                    let c1 = Point::new(start.x + args[0], start.y + args[1]);
                    let c2 = Point::new(start.x + args[2], start.y + args[3]);
                    end = Point::new(start.x + args[4], start.y + args[5]);
                    last_control = Some(LastControl { point: c2, cubic: true });
                    points = flatten_cubic(start, c1, c2, end);
                }
                's' => {
                    let c1 = reflect(start, last_control, true);
                    let c2 = Point::new(start.x + args[0], start.y + args[1]);
                    end = Point::new(start.x + args[2], start.y + args[3]);
                    last_control = Some(LastControl { point: c2, cubic: true });
                    points = flatten_cubic(start, c1, c2, end);
                }
                'q' => {
                    let c1 = Point::new(start.x + args[0], start.y + args[1]);
                    end = Point::new(start.x + args[2], start.y + args[3]);
                    last_control = Some(LastControl { point: c1, cubic: false });
                    points = flatten_quadratic(start, c1, end);
                }
                't' => {
                    let c1 = reflect(start, last_control, false);
                    end = Point::new(start.x + args[0], start.y + args[1]);
                    last_control = Some(LastControl { point: c1, cubic: false });
                    points = flatten_quadratic(start, c1, end);
                }
                'a' => {
                    let (rx, ry, x_rot, large, sweep) = (args[0], args[1], args[2], args[3] != 0.0, args[4] != 0.0);
                    end = Point::new(start.x + args[5], start.y + args[6]);
                    points = flatten_arc(start, rx, ry, x_rot, large, sweep, end);
                }
                'z' => {
                    end = subpath_start;
                    points = vec![end];
                }
                other => unreachable!("not a relative path-block command: {other}"),
            }
            if *letter == 'm' || *letter == 'z' {
                last_control = None;
            }
            let mut prev = start;
            for p in &points {
                let dx = p.x - prev.x;
                let dy = p.y - prev.y;
                let seg_len = dx.hypot(dy);
                if seg_len > 0.0 {
                    cum_len += seg_len;
                    samples.push(Sample { len: cum_len, point: *p, angle: dy.atan2(dx) });
                }
                prev = *p;
            }
            vertices.push(end);
            sub_path_commands.push(SubPathCommand { command: *letter, args: args.clone(), start, end });
            if *letter == 'm' {
                subpath_start = end;
            }
            pos = end;
        }

        if !ctx.commands.is_empty() {
            sub_path_count += 1;
        }

        Self {
            tokens: ctx.tokens.clone(),
            start_point: Point::new(0.0, 0.0),
            end_point: pos,
            vertices,
            sub_path_count,
            sub_path_commands,
            length: cum_len,
            samples,
        }
    }

    pub fn get(&self, t: f64) -> Result<Point> {
        Ok(self.sample(t)?.point)
    }

    pub fn tangent(&self, t: f64) -> Result<(Point, f64)> {
        let s = self.sample(t)?;
        Ok((s.point, s.angle))
    }

    pub fn normal(&self, t: f64) -> Result<(Point, f64)> {
        let s = self.sample(t)?;
        Ok((s.point, s.angle - std::f64::consts::FRAC_PI_2))
    }

    pub fn partition(&self, n: f64) -> Result<Vec<(Point, f64)>> {
        if n < 1.0 || n.fract() != 0.0 {
            return Err(CompileError::new(ErrorKind::RangeError, "partition(n) requires a positive integer n", crate::ast::Loc { line: 0, column: 0 }));
        }
        let n = n as u64;
        let mut out = Vec::with_capacity(n as usize + 1);
        for i in 0..=n {
            let t = i as f64 / n as f64;
            let s = self.sample(t)?;
            out.push((s.point, s.angle));
        }
        Ok(out)
    }

    fn sample(&self, t: f64) -> Result<Sampled> {
        if !(0.0..=1.0).contains(&t) {
            return Err(CompileError::new(ErrorKind::RangeError, "t must be within [0, 1]", crate::ast::Loc { line: 0, column: 0 }));
        }
        if self.samples.len() == 1 {
            return Ok(Sampled { point: self.samples[0].point, angle: 0.0 });
        }
        let target = t * self.length;
        let mut i = 1;
        while i < self.samples.len() - 1 && self.samples[i].len < target {
            i += 1;
        }
        let prev = self.samples[i - 1];
        let next = self.samples[i];
        let span = next.len - prev.len;
        let local_t = if span > 0.0 { (target - prev.len) / span } else { 0.0 };
        let point = Point::new(prev.point.x + (next.point.x - prev.point.x) * local_t, prev.point.y + (next.point.y - prev.point.y) * local_t);
        Ok(Sampled { point, angle: next.angle })
    }
}

fn reflect(current: Point, last_control: Option<LastControl>, cubic: bool) -> Point {
    match last_control {
        Some(lc) if lc.cubic == cubic => Point::new(2.0 * current.x - lc.point.x, 2.0 * current.y - lc.point.y),
        _ => current,
    }
}

fn flatten_cubic(p0: Point, c1: Point, c2: Point, p3: Point) -> Vec<Point> {
    (1..=FLATTEN_STEPS)
        .map(|i| {
            let t = i as f64 / FLATTEN_STEPS as f64;
            let mt = 1.0 - t;
            let x = mt * mt * mt * p0.x + 3.0 * mt * mt * t * c1.x + 3.0 * mt * t * t * c2.x + t * t * t * p3.x;
            let y = mt * mt * mt * p0.y + 3.0 * mt * mt * t * c1.y + 3.0 * mt * t * t * c2.y + t * t * t * p3.y;
            Point::new(x, y)
        })
        .collect()
}

fn flatten_quadratic(p0: Point, c1: Point, p2: Point) -> Vec<Point> {
    (1..=FLATTEN_STEPS)
        .map(|i| {
            let t = i as f64 / FLATTEN_STEPS as f64;
            let mt = 1.0 - t;
            let x = mt * mt * p0.x + 2.0 * mt * t * c1.x + t * t * p2.x;
            let y = mt * mt * p0.y + 2.0 * mt * t * c1.y + t * t * p2.y;
            Point::new(x, y)
        })
        .collect()
}

/// SVG arc endpoint-to-center parameterisation (implementation note 4.10
/// item `a`), flattened to a polyline for uniform sampling.
fn flatten_arc(p0: Point, rx: f64, ry: f64, x_axis_rotation_deg: f64, large_arc: bool, sweep: bool, p1: Point) -> Vec<Point> {
    let mut rx = rx.abs();
    let mut ry = ry.abs();
    if rx == 0.0 || ry == 0.0 {
        return vec![p1];
    }
    let phi = x_axis_rotation_deg.to_radians();
    let (cos_phi, sin_phi) = (phi.cos(), phi.sin());

    let dx2 = (p0.x - p1.x) / 2.0;
    let dy2 = (p0.y - p1.y) / 2.0;
    let x1p = cos_phi * dx2 + sin_phi * dy2;
    let y1p = -sin_phi * dx2 + cos_phi * dy2;

    let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
    if lambda > 1.0 {
        let scale = lambda.sqrt();
        rx *= scale;
        ry *= scale;
    }

    let sign = if large_arc != sweep { 1.0 } else { -1.0 };
    let num = (rx * rx * ry * ry - rx * rx * y1p * y1p - ry * ry * x1p * x1p).max(0.0);
    let den = rx * rx * y1p * y1p + ry * ry * x1p * x1p;
    let coef = if den > 0.0 { sign * (num / den).sqrt() } else { 0.0 };
    let cxp = coef * (rx * y1p) / ry;
    let cyp = coef * (-ry * x1p) / rx;

    let cx = cos_phi * cxp - sin_phi * cyp + (p0.x + p1.x) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (p0.y + p1.y) / 2.0;

    let angle = |ux: f64, uy: f64, vx: f64, vy: f64| -> f64 {
        let dot = ux * vx + uy * vy;
        let len = (ux * ux + uy * uy).sqrt() * (vx * vx + vy * vy).sqrt();
        let mut a = (dot / len).clamp(-1.0, 1.0).acos();
        if ux * vy - uy * vx < 0.0 {
            a = -a;
        }
        a
    };

    let theta1 = angle(1.0, 0.0, (x1p - cxp) / rx, (y1p - cyp) / ry);
    let mut delta = angle((x1p - cxp) / rx, (y1p - cyp) / ry, (-x1p - cxp) / rx, (-y1p - cyp) / ry);
    if !sweep && delta > 0.0 {
        delta -= 2.0 * std::f64::consts::PI;
    } else if sweep && delta < 0.0 {
        delta += 2.0 * std::f64::consts::PI;
    }

    (1..=FLATTEN_STEPS)
        .map(|i| {
            let t = i as f64 / FLATTEN_STEPS as f64;
            let theta = theta1 + delta * t;
            let x = cx + rx * theta.cos() * cos_phi - ry * theta.sin() * sin_phi;
            let y = cy + rx * theta.cos() * sin_phi + ry * theta.sin() * cos_phi;
            Point::new(x, y)
        })
        .collect()
}
