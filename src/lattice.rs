//! Dimerized ring topology: alternating weak/strong bonds on a periodic chain.

/// Bond table for a 1D dimerized Heisenberg ring.
///
/// `L` sites, `L` bonds; bond `i` connects sites `i` and `(i+1) % L`.
/// Even-index bonds carry the weak coupling `jw`, odd-index bonds the
/// strong coupling `1.0`.
#[derive(Debug, Clone)]
pub struct Lattice {
    pub n_sites: usize,
    /// Endpoint sites of each bond.
    pub bonds: Vec<[usize; 2]>,
    /// Coupling on each bond.
    pub coupling: Vec<f64>,
    /// True for weak (rescaled) bonds.
    pub weak: Vec<bool>,
}

impl Lattice {
    /// Build the dimerized ring.
    ///
    /// Precondition: `l` is even and at least 2.
    pub fn dimerized_ring(l: usize, jw: f64) -> Self {
        assert!(l >= 2 && l % 2 == 0, "chain length must be even and >= 2, got {l}");

        let mut bonds = Vec::with_capacity(l);
        let mut coupling = Vec::with_capacity(l);
        let mut weak = Vec::with_capacity(l);

        for i in 0..l {
            bonds.push([i, (i + 1) % l]);
            if i % 2 == 0 {
                coupling.push(jw);
                weak.push(true);
            } else {
                coupling.push(1.0);
                weak.push(false);
            }
        }

        Self { n_sites: l, bonds, coupling, weak }
    }

    #[inline(always)]
    pub fn n_bonds(&self) -> usize {
        self.bonds.len()
    }
}
