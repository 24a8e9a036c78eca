use std::collections::BTreeMap;

use crate::core::BodyHandle;

/// Groups bodies connected through contacts or constraints.
///
/// Islands are rebuilt from scratch every step with a union-find over the
/// dynamic bodies. Island order and the body order inside an island follow
/// the handle order, so the result does not depend on insertion history.
#[derive(Debug, Default, Clone)]
pub struct IslandManager {
    index_of: BTreeMap<BodyHandle, usize>,
    parent: Vec<usize>,
    rank: Vec<u8>,
    islands: Vec<Vec<BodyHandle>>,
}

impl IslandManager {
    /// Creates an empty island manager
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// Rebuilds the islands. Links that mention a body outside `bodies` are
    /// ignored, so static bodies never join two islands together.
    pub fn build<I>(&mut self, bodies: &[BodyHandle], links: I)
    where
        I: IntoIterator<Item = (BodyHandle, BodyHandle)>,
    {
        self.index_of.clear();
        self.islands.clear();

        let mut sorted = bodies.to_vec();
        sorted.sort();
        sorted.dedup();
        for (i, handle) in sorted.iter().enumerate() {
            self.index_of.insert(*handle, i);
        }
        self.parent = (0..sorted.len()).collect();
        self.rank = vec![0; sorted.len()];

        for (a, b) in links {
            if let (Some(&ia), Some(&ib)) = (self.index_of.get(&a), self.index_of.get(&b)) {
                self.union(ia, ib);
            }
        }

        let mut island_of_root: BTreeMap<usize, usize> = BTreeMap::new();
        for (i, handle) in sorted.iter().enumerate() {
            let root = self.find(i);
            let next = self.islands.len();
            let island = *island_of_root.entry(root).or_insert(next);
            if island == next {
                self.islands.push(Vec::new());
            }
            self.islands[island].push(*handle);
        }
    }

    /// The islands of the last build
    pub fn islands(&self) -> &[Vec<BodyHandle>] {
        &self.islands
    }

    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    /// Index of the island containing `body`
    pub fn island_of(&self, body: BodyHandle) -> Option<usize> {
        self.islands.iter().position(|island| island.contains(&body))
    }
}
