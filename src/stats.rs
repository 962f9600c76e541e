use std::fmt;
use std::ops::AddAssign;

#[derive(Debug, Default)]
pub struct Stats {
    pub num_nodes: usize,
    pub num_ways: usize,
    pub num_relations: usize,
    pub num_changesets: usize,
    pub num_tags: usize,
    pub num_buffers: usize,
}

impl AddAssign for Stats {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.num_nodes += other.num_nodes;
        self.num_ways += other.num_ways;
        self.num_relations += other.num_relations;
        self.num_changesets += other.num_changesets;
        self.num_tags += other.num_tags;
        self.num_buffers += other.num_buffers;
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            r#"Read:
  nodes:        {}
  ways:         {}
  relations:    {}
  changesets:   {}
  tags:         {}
  buffers:      {}"#,
            self.num_nodes,
            self.num_ways,
            self.num_relations,
            self.num_changesets,
            self.num_tags,
            self.num_buffers
        )
    }
}
