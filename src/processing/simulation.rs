// src/processing/simulation.rs
//
// A small CPU smoke solver: sources stamp density and velocity, both fields
// are advected semi-Lagrangian style, density slowly fades.

use crate::message::Source;

pub const TIME_STEP: f32 = 0.033;
const DENSITY_DECAY: f32 = 0.995;
const VELOCITY_DAMPING: f32 = 0.99;
const VISCOSITY: f32 = 0.5;

pub struct Simulation {
    width: usize,
    height: usize,
    sources: Vec<Source>,
    density: Vec<f32>,
    velocity_x: Vec<f32>,
    velocity_y: Vec<f32>,
    scratch: Vec<f32>,
}

impl Simulation {
    pub fn new(width: u32, height: u32, sources: Vec<Source>) -> Self {
        let (width, height) = (width as usize, height as usize);
        let cells = width * height;
        Self {
            width,
            height,
            sources,
            density: vec![0.0; cells],
            velocity_x: vec![0.0; cells],
            velocity_y: vec![0.0; cells],
            scratch: vec![0.0; cells],
        }
    }

    pub fn step(&mut self) {
        let (width, height) = (self.width, self.height);
        self.apply_sources();

        diffuse(&mut self.velocity_x, &mut self.scratch, width, height);
        diffuse(&mut self.velocity_y, &mut self.scratch, width, height);

        // Velocity carries itself, then carries density.
        let grid = Grid { width, height };
        let mut velocity_x = vec![0.0; self.velocity_x.len()];
        let velocity = (&self.velocity_x[..], &self.velocity_y[..]);
        grid.advect(&self.velocity_x, velocity, &mut velocity_x, VELOCITY_DAMPING);
        grid.advect(&self.velocity_y, velocity, &mut self.scratch, VELOCITY_DAMPING);
        self.velocity_x = velocity_x;
        std::mem::swap(&mut self.velocity_y, &mut self.scratch);

        let velocity = (&self.velocity_x[..], &self.velocity_y[..]);
        grid.advect(&self.density, velocity, &mut self.scratch, DENSITY_DECAY);
        std::mem::swap(&mut self.density, &mut self.scratch);
    }

    /// Density clamped to `[0, 1]`, row-major.
    pub fn pixels(&self) -> Vec<f32> {
        self.density.iter().map(|d| d.clamp(0.0, 1.0)).collect()
    }

    pub fn density_at(&self, x: usize, y: usize) -> f32 {
        self.density[y * self.width + x]
    }

    fn apply_sources(&mut self) {
        for source in &self.sources {
            let (xs, ys) = cells_covered(source, self.width, self.height);
            for y in ys.clone() {
                for x in xs.clone() {
                    let i = y * self.width + x;
                    self.density[i] = source.density;
                    self.velocity_x[i] = source.force[0];
                    self.velocity_y[i] = source.force[1];
                }
            }
        }
    }
}

fn cells_covered(
    source: &Source,
    width: usize,
    height: usize,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let span = |centre: f32, extent: f32, limit: usize| {
        let start = (centre - extent / 2.0).floor().max(0.0) as usize;
        let end = ((centre + extent / 2.0).ceil().max(0.0) as usize).min(limit);
        start.min(end)..end
    };
    (
        span(source.position[0], source.size[0], width),
        span(source.position[1], source.size[1], height),
    )
}

/// Relaxes each cell towards the mean of its four neighbours.
fn diffuse(field: &mut [f32], scratch: &mut [f32], width: usize, height: usize) {
    for y in 0..height {
        for x in 0..width {
            let at = |x: usize, y: usize| field[y * width + x];
            let neighbours = at(x.saturating_sub(1), y)
                + at((x + 1).min(width - 1), y)
                + at(x, y.saturating_sub(1))
                + at(x, (y + 1).min(height - 1));
            let here = at(x, y);
            scratch[y * width + x] = here + VISCOSITY * (neighbours / 4.0 - here);
        }
    }
    field.copy_from_slice(scratch);
}

#[derive(Clone, Copy)]
struct Grid {
    width: usize,
    height: usize,
}

impl Grid {
    /// Semi-Lagrangian transport of `field` along `(u, v)` into `out`.
    fn advect(&self, field: &[f32], (u, v): (&[f32], &[f32]), out: &mut [f32], fade: f32) {
        let (width, height) = (self.width, self.height);
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                let from_x = x as f32 - TIME_STEP * u[i];
                let from_y = y as f32 - TIME_STEP * v[i];
                out[i] = sample(field, width, height, from_x, from_y) * fade;
            }
        }
    }
}

/// Bilinear lookup with coordinates clamped to the grid.
fn sample(field: &[f32], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let (x0, y0) = (x.floor() as usize, y.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (tx, ty) = (x - x0 as f32, y - y0 as f32);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let top = lerp(field[y0 * width + x0], field[y0 * width + x1], tx);
    let bottom = lerp(field[y1 * width + x0], field[y1 * width + x1], tx);
    lerp(top, bottom, ty)
}
