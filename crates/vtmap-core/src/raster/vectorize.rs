//! Raster → polygons: one feature per 4-connected region of equal value.

use std::collections::HashMap;

use super::{Raster, RasterError};
use crate::vector::{signed_area, Feature, Polygon, Ring};

type Vertex = (i64, i64);

pub(crate) fn vectorize(input: &Raster, class_field: &str) -> Result<Vec<Feature>, RasterError> {
    let (w, h) = (input.width(), input.height());
    let mut label = vec![usize::MAX; w * h];
    let mut features = Vec::new();
    let mut stack = Vec::new();

    for start in 0..w * h {
        if label[start] != usize::MAX || input.is_nodata(input.data[start]) {
            continue;
        }
        let id = features.len();
        let value = input.data[start];
        let mut members = Vec::new();
        label[start] = id;
        stack.push(start);
        while let Some(idx) = stack.pop() {
            members.push(idx);
            let (row, col) = (idx / w, idx % w);
            let neighbours = [
                (row > 0).then(|| idx - w),
                (row + 1 < h).then(|| idx + w),
                (col > 0).then(|| idx - 1),
                (col + 1 < w).then(|| idx + 1),
            ];
            for n in neighbours.into_iter().flatten() {
                if label[n] == usize::MAX && input.data[n] == value {
                    label[n] = id;
                    stack.push(n);
                }
            }
        }

        let rings = trace_rings(&members, &label, id, w, h);
        let polygon = assemble(rings, input);
        features.push(Feature::new(vec![polygon]).with_property(class_field, value as f64));
    }
    Ok(features)
}

/// Boundary edges of one region, chained into closed rings in vertex space
/// (vertex (x, y) is the top-left corner of pixel column x, row y).
fn trace_rings(members: &[usize], label: &[usize], id: usize, w: usize, h: usize) -> Vec<Vec<Vertex>> {
    let inside = |row: i64, col: i64| {
        row >= 0 && col >= 0 && (row as usize) < h && (col as usize) < w && label[row as usize * w + col as usize] == id
    };

    // Each edge keeps the region on its left when drawn with y down.
    let mut edges: Vec<(Vertex, Vertex)> = Vec::new();
    for &idx in members {
        let (r, c) = ((idx / w) as i64, (idx % w) as i64);
        if !inside(r - 1, c) {
            edges.push(((c + 1, r), (c, r)));
        }
        if !inside(r + 1, c) {
            edges.push(((c, r + 1), (c + 1, r + 1)));
        }
        if !inside(r, c - 1) {
            edges.push(((c, r), (c, r + 1)));
        }
        if !inside(r, c + 1) {
            edges.push(((c + 1, r + 1), (c + 1, r)));
        }
    }

    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, &(from, _)) in edges.iter().enumerate() {
        outgoing.entry(from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let origin = edges[first].0;
        let mut ring = vec![origin];
        let mut current = first;
        loop {
            let (from, to) = edges[current];
            ring.push(to);
            if to == origin {
                break;
            }
            let dir = (to.0 - from.0, to.1 - from.1);
            let next = outgoing
                .get(&to)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&e| !used[e])
                .min_by_key(|&e| turn_rank(dir, edges[e]));
            match next {
                Some(e) => {
                    used[e] = true;
                    current = e;
                }
                None => break,
            }
        }
        rings.push(simplify(ring));
    }
    rings
}

/// Prefer turning towards the region (left), then straight, then right, so a
/// ring never crosses between two diagonally touching pixels.
fn turn_rank(dir: (i64, i64), edge: (Vertex, Vertex)) -> u8 {
    let next = (edge.1 .0 - edge.0 .0, edge.1 .1 - edge.0 .1);
    let left = (dir.1, -dir.0);
    if next == left {
        0
    } else if next == dir {
        1
    } else {
        2
    }
}

/// Drop vertices in the middle of straight runs.
fn simplify(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    if n < 4 {
        return ring;
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n - 1 {
        let prev = if i == 0 { ring[n - 2] } else { ring[i - 1] };
        let (a, b) = (ring[i], ring[i + 1]);
        let collinear = (a.0 - prev.0) * (b.1 - a.1) == (a.1 - prev.1) * (b.0 - a.0);
        if !collinear {
            out.push(a);
        }
    }
    if let Some(&first) = out.first() {
        out.push(first);
    }
    out
}

/// Largest ring is the exterior (counter-clockwise), the rest are holes
/// (clockwise), in world coordinates.
fn assemble(rings: Vec<Vec<Vertex>>, input: &Raster) -> Polygon {
    let g = &input.grid;
    let (pw, ph) = (g.pixel_width(), g.pixel_height());
    let mut world: Vec<Ring> = rings
        .into_iter()
        .map(|r| {
            r.into_iter()
                .map(|(x, y)| [g.extent.min_x + x as f64 * pw, g.extent.max_y - y as f64 * ph])
                .collect()
        })
        .collect();
    world.sort_by(|a, b| signed_area(b).abs().total_cmp(&signed_area(a).abs()));

    let mut iter = world.into_iter();
    let mut exterior = iter.next().unwrap_or_default();
    if signed_area(&exterior) < 0.0 {
        exterior.reverse();
    }
    let holes = iter
        .map(|mut hole| {
            if signed_area(&hole) > 0.0 {
                hole.reverse();
            }
            hole
        })
        .collect();
    Polygon::new(exterior, holes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Crs, Extent};
    use crate::raster::{rasterize::rasterize, GridSpec};

    fn raster(w: usize, h: usize, data: Vec<f32>) -> Raster {
        let grid = GridSpec::new(Crs::Utm { zone: 1, north: true }, Extent::new(0.0, 0.0, w as f64 * 2.0, h as f64 * 2.0), w, h);
        Raster::from_data(grid, data, None).unwrap()
    }

    #[test]
    fn single_block_becomes_rectangle() {
        let r = raster(3, 2, vec![1.0; 6]);
        let fs = vectorize(&r, "class").unwrap();
        assert_eq!(fs.len(), 1);
        let p = &fs[0].polygons[0];
        assert_eq!(p.exterior.len(), 5);
        assert!(p.holes.is_empty());
        assert!((signed_area(&p.exterior) - 24.0).abs() < 1e-9);
        assert_eq!(fs[0].number("class"), Some(1.0));
    }

    #[test]
    fn ring_with_hole() {
        #[rustfmt::skip]
        let r = raster(3, 3, vec![
            1.0, 1.0, 1.0,
            1.0, 0.0, 1.0,
            1.0, 1.0, 1.0,
        ]);
        let fs = vectorize(&r, "class").unwrap();
        assert_eq!(fs.len(), 2);
        let ring = fs.iter().find(|f| f.number("class") == Some(1.0)).unwrap();
        assert_eq!(ring.polygons[0].holes.len(), 1);
        assert!((ring.area() - 32.0).abs() < 1e-9);
    }

    #[test]
    fn diagonal_pixels_are_separate_regions() {
        #[rustfmt::skip]
        let r = raster(2, 2, vec![
            5.0, 0.0,
            0.0, 5.0,
        ]);
        let fs = vectorize(&r, "class").unwrap();
        assert_eq!(fs.len(), 4);
    }

    #[test]
    fn rasterizing_the_polygons_restores_the_raster() {
        #[rustfmt::skip]
        let data = vec![
            0.0, 2.0, 2.0, 0.0, 3.0,
            2.0, 2.0, 0.0, 0.0, 3.0,
            2.0, 0.0, 2.0, 2.0, 3.0,
            2.0, 2.0, 2.0, 0.0, 0.0,
        ];
        let r = raster(5, 4, data);
        let fs = vectorize(&r, "class").unwrap();
        let back = rasterize(&fs, "class", &r.grid, -1.0).unwrap();
        assert_eq!(back.data, r.data);
    }

    #[test]
    fn nodata_is_skipped() {
        let r = raster(2, 1, vec![-1.0, 4.0]).with_nodata(Some(-1.0));
        let fs = vectorize(&r, "class").unwrap();
        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].number("class"), Some(4.0));
    }
}
