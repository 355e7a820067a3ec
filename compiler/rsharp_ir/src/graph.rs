//! Interference graph and the backtracking coloring heuristic

use std::collections::BTreeSet;

/// Opaque color identity, scoped to one allocation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColorId(pub u32);

/// Hands out fresh color identities; palette colors first, then
/// pre-coloring and spill colors
#[derive(Debug, Default)]
pub struct ColorAllocator {
    next: u32,
}

impl ColorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> ColorId {
        let color = ColorId(self.next);
        self.next += 1;
        color
    }
}

#[derive(Debug, Clone)]
struct Vertex {
    color: Option<ColorId>,
    neighbours: BTreeSet<usize>,
    removed: bool,
}

/// Undirected interference graph over vertex indices
#[derive(Debug, Default)]
pub struct Graph {
    vertices: Vec<Vertex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, color: Option<ColorId>) -> usize {
        let index = self.vertices.len();
        self.vertices.push(Vertex { color, neighbours: BTreeSet::new(), removed: false });
        index
    }

    pub fn add_edge(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.vertices[a].neighbours.insert(b);
        self.vertices[b].neighbours.insert(a);
    }

    pub fn color(&self, vertex: usize) -> Option<ColorId> {
        self.vertices[vertex].color
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    fn active(&self) -> Vec<usize> {
        (0..self.vertices.len())
            .filter(|&v| !self.vertices[v].removed)
            .collect()
    }

    fn active_neighbours(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertices[vertex]
            .neighbours
            .iter()
            .copied()
            .filter(|&n| !self.vertices[n].removed)
    }

    /// Lower ranks first: already-colored vertices, then fewer colored
    /// neighbours, then fewer uncolored neighbours
    fn triviality(&self, vertex: usize) -> (u8, usize, usize) {
        let uncolored = u8::from(self.vertices[vertex].color.is_none());
        let mut colored_neighbours = 0;
        let mut uncolored_neighbours = 0;
        for neighbour in self.active_neighbours(vertex) {
            if self.vertices[neighbour].color.is_some() {
                colored_neighbours += 1;
            } else {
                uncolored_neighbours += 1;
            }
        }
        (uncolored, colored_neighbours, uncolored_neighbours)
    }

    fn restore(&mut self, snapshot: &[(usize, Option<ColorId>)]) {
        for (vertex, color) in snapshot {
            self.vertices[*vertex].color = *color;
        }
    }

    /// Remove-most-trivial-first coloring.
    ///
    /// A removal candidate is taken out of the graph, the rest is colored
    /// recursively, and the candidate is colored afterwards against its
    /// neighbours. Pre-colored vertices are never removed: their colors
    /// must stay visible to the recursion, otherwise every fixed register
    /// invites avoidable conflicts. Palette colors are preferred; when
    /// none is free the vertex receives a fresh non-assignable color from
    /// `spill_colors` (stack colors are unlimited, so the only way to fail
    /// is a conflict between pre-colored vertices).
    pub fn color_in(&mut self, palette: &[ColorId], spill_colors: &mut ColorAllocator) -> bool {
        let active = self.active();

        let mut order: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&v| self.vertices[v].color.is_none())
            .collect();
        if order.is_empty() {
            // only pre-colored vertices remain: verify the pre-coloring
            return !active.iter().any(|&v| {
                let color = self.vertices[v].color;
                self.active_neighbours(v).any(|n| self.vertices[n].color == color)
            });
        }
        order.sort_by_key(|&v| self.triviality(v));

        let snapshot: Vec<(usize, Option<ColorId>)> =
            active.iter().map(|&v| (v, self.vertices[v].color)).collect();

        for &candidate in &order {
            self.vertices[candidate].removed = true;
            let colored_rest = self.color_in(palette, spill_colors);
            self.vertices[candidate].removed = false;

            if !colored_rest {
                self.restore(&snapshot);
                continue;
            }

            let neighbour_colors: BTreeSet<ColorId> = self
                .active_neighbours(candidate)
                .filter_map(|n| self.vertices[n].color)
                .collect();
            let choice = palette
                .iter()
                .copied()
                .find(|c| !neighbour_colors.contains(c))
                .unwrap_or_else(|| spill_colors.fresh());
            self.vertices[candidate].color = Some(choice);
            return true;
        }

        self.restore(&snapshot);
        false
    }
}
