//! Per-layer drawing cursor and token accumulator (spec §4.4).

use crate::{
    numeric::{format_flag, format_number},
    value::Point,
};

/// Cubic/quadratic control point retained for the smooth (`S`/`T`) variants.
#[derive(Debug, Clone, Copy)]
pub struct LastControl {
    pub point: Point,
    /// `true` for a cubic control point (`C`/`S`), `false` for quadratic
    /// (`Q`/`T`) — the two families never reflect into one another.
    pub cubic: bool,
}

#[derive(Debug, Clone)]
pub struct PathContext {
    pub position: Point,
    pub subpath_start: Point,
    pub last_control: Option<LastControl>,
    pub tokens: Vec<String>,
    pub in_path_block: bool,
    /// Parallel record of `(letter, evaluated args)` per emitted command,
    /// consumed by [`crate::pathblock::PathBlockData::from_context`] to
    /// rebuild geometry without re-parsing `tokens`.
    pub commands: Vec<(char, Vec<f64>)>,
}

impl PathContext {
    pub fn new() -> Self {
        Self {
            position: Point::new(0.0, 0.0),
            subpath_start: Point::new(0.0, 0.0),
            last_control: None,
            tokens: Vec::new(),
            in_path_block: false,
            commands: Vec::new(),
        }
    }

    pub fn new_path_block() -> Self {
        let mut ctx = Self::new();
        ctx.in_path_block = true;
        ctx
    }

    pub fn data(&self) -> String {
        self.tokens.join(" ")
    }

    /// Appends `"<letter> <arg1> <arg2> …"` and updates cursor state
    /// (spec §4.4 `emit`). `args` are already-evaluated numeric values in
    /// source order; `to_fixed` controls numeric rendering (spec §4.9).
    /// `A`/`a`'s `largeArc`/`sweep` flags (argument indices 3 and 4) are
    /// always rendered as plain integers, never subject to `to_fixed`.
    pub fn emit(&mut self, letter: char, args: &[f64], to_fixed: Option<u32>) {
        let is_arc = letter.to_ascii_uppercase() == 'A';
        let rendered: Vec<String> = args
            .iter()
            .enumerate()
            .map(|(i, v)| if is_arc && (i == 3 || i == 4) { format_flag(*v) } else { format_number(*v, to_fixed) })
            .collect();
        let mut token = String::new();
        token.push(letter);
        for r in &rendered {
            token.push(' ');
            token.push_str(r);
        }
        self.tokens.push(token);
        self.commands.push((letter, args.to_vec()));
        self.apply_cursor(letter, args);
    }

    fn rel(&self, letter: char) -> bool {
        letter.is_lowercase()
    }

    fn apply_cursor(&mut self, letter: char, args: &[f64]) {
        let relative = self.rel(letter);
        let base = self.position;
        match letter.to_ascii_uppercase() {
            'M' => {
                let p = self.abs_point(base, relative, args[0], args[1]);
                self.position = p;
                self.subpath_start = p;
                self.last_control = None;
            }
            'L' => {
                self.position = self.abs_point(base, relative, args[0], args[1]);
                self.last_control = None;
            }
            'H' => {
                let x = if relative { base.x + args[0] } else { args[0] };
                self.position = Point::new(x, base.y);
                self.last_control = None;
            }
            'V' => {
                let y = if relative { base.y + args[0] } else { args[0] };
                self.position = Point::new(base.x, y);
                self.last_control = None;
            }
            'C' => {
                let c2 = self.abs_point(base, relative, args[2], args[3]);
                let end = self.abs_point(base, relative, args[4], args[5]);
                self.last_control = Some(LastControl { point: c2, cubic: true });
                self.position = end;
            }
            'S' => {
                let c2 = self.abs_point(base, relative, args[0], args[1]);
                let end = self.abs_point(base, relative, args[2], args[3]);
                self.last_control = Some(LastControl { point: c2, cubic: true });
                self.position = end;
            }
            'Q' => {
                let c1 = self.abs_point(base, relative, args[0], args[1]);
                let end = self.abs_point(base, relative, args[2], args[3]);
                self.last_control = Some(LastControl { point: c1, cubic: false });
                self.position = end;
            }
            'T' => {
                let end = self.abs_point(base, relative, args[0], args[1]);
                self.last_control = None;
                self.position = end;
            }
            'A' => {
                let end = self.abs_point(base, relative, args[5], args[6]);
                self.position = end;
                self.last_control = None;
            }
            'Z' => {
                self.position = self.subpath_start;
                self.last_control = None;
            }
            _ => unreachable!("not a path command letter: {letter}"),
        }
    }

    fn abs_point(&self, base: Point, relative: bool, x: f64, y: f64) -> Point {
        if relative {
            Point::new(base.x + x, base.y + y)
        } else {
            Point::new(x, y)
        }
    }

    /// The reflected control point for a smooth `S`/`T` command: twice the
    /// current position minus the last same-family control point, or the
    /// current position itself if there is none.
    pub fn reflected_control(&self, cubic: bool) -> Point {
        match self.last_control {
            Some(lc) if lc.cubic == cubic => Point::new(2.0 * self.position.x - lc.point.x, 2.0 * self.position.y - lc.point.y),
            _ => self.position,
        }
    }
}

impl Default for PathContext {
    fn default() -> Self {
        Self::new()
    }
}
