/// Disjoint-set forest over `0..n` with union by rank and path halving.
///
/// Iterative throughout: component sizes in a linking run reach millions of states and
/// recursion depth must not depend on them.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            let grand = self.parent[self.parent[x]];
            self.parent[x] = grand;
            x = grand;
        }
        x
    }

    /// Merge the sets of `a` and `b`. Returns `false` if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    /// All sets, members ascending, sets ordered by their smallest member.
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut slot_of_root = vec![usize::MAX; n];
        let mut components: Vec<Vec<usize>> = Vec::new();
        for x in 0..n {
            let root = self.find(x);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = components.len();
                components.push(Vec::new());
            }
            components[slot_of_root[root]].push(x);
        }
        components
    }
}

#[cfg(test)]
mod union_find_test {
    use super::*;

    #[test]
    fn merges_and_orders_components() {
        let mut uf = UnionFind::new(6);
        assert!(uf.union(4, 1));
        assert!(uf.union(5, 3));
        assert!(uf.union(1, 5));
        assert!(!uf.union(3, 4));
        assert_eq!(uf.components(), vec![vec![0], vec![1, 3, 4, 5], vec![2]]);
    }

    #[test]
    fn long_chain_does_not_recurse() {
        let n = 200_000;
        let mut uf = UnionFind::new(n);
        for i in 1..n {
            uf.union(i - 1, i);
        }
        assert_eq!(uf.find(n - 1), uf.find(0));
        assert_eq!(uf.components().len(), 1);
    }

    #[test]
    fn empty() {
        let mut uf = UnionFind::new(0);
        assert!(uf.is_empty());
        assert!(uf.components().is_empty());
    }
}
