//! Reference problem instances.
//!
//! - [`RoutingInstance`]: a tour leaving a depot, visiting every customer once
//!   and returning, over a Euclidean distance matrix. Parsed from TSP-LIB
//!   style files.
//! - [`MaintenanceInstance`]: single-machine job sequencing where processing
//!   times deteriorate with the number of jobs run since the last maintenance
//!   slot, with sequence-dependent setup times playing the role of the
//!   distance matrix. Loaded from JSON.

use crate::error::SearchError;
use crate::problem::{Evaluation, Problem};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A node of a routing instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier (1-indexed in files, 0-indexed internally, 0 is the depot)
    pub id: usize,
    pub x: f64,
    pub y: f64,
}

impl Node {
    pub fn new(id: usize, x: f64, y: f64) -> Self {
        Node { id, x, y }
    }
}

/// Depot-based tour over a Euclidean distance matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RoutingRecord")]
pub struct RoutingInstance {
    pub name: String,
    pub comment: String,
    /// Number of nodes including the depot
    pub dimension: usize,
    pub nodes: Vec<Node>,
    pub distance_matrix: Vec<Vec<f64>>,
    pub difficulty: usize,
}

/// Stored form of a [`RoutingInstance`]; without a matrix, distances are
/// recomputed from the node coordinates
#[derive(Deserialize)]
struct RoutingRecord {
    name: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    distance_matrix: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    difficulty: Option<usize>,
}

impl TryFrom<RoutingRecord> for RoutingInstance {
    type Error = SearchError;

    fn try_from(record: RoutingRecord) -> Result<Self, Self::Error> {
        let mut instance = match record.distance_matrix {
            Some(matrix) => {
                let mut instance = RoutingInstance::from_matrix(&record.name, matrix)?;
                if record.nodes.len() == instance.dimension {
                    instance.nodes = record.nodes;
                }
                instance
            }
            None => {
                let coords: Vec<(f64, f64)> = record.nodes.iter().map(|n| (n.x, n.y)).collect();
                if coords.len() < 2 {
                    return Err(SearchError::Parse(
                        "routing instance needs a depot and one customer".into(),
                    ));
                }
                RoutingInstance::from_coordinates(&record.name, &coords)
            }
        };
        instance.comment = record.comment;
        if let Some(difficulty) = record.difficulty {
            instance = instance.with_difficulty(difficulty);
        }
        Ok(instance)
    }
}

impl RoutingInstance {
    /// Build an instance from coordinates; the first node is the depot
    pub fn from_coordinates(name: &str, coords: &[(f64, f64)]) -> Self {
        let nodes: Vec<Node> = coords
            .iter()
            .enumerate()
            .map(|(id, &(x, y))| Node::new(id, x, y))
            .collect();
        let distance_matrix = Self::compute_distance_matrix(&nodes);
        let dimension = nodes.len();

        RoutingInstance {
            name: name.to_string(),
            comment: String::new(),
            dimension,
            nodes,
            distance_matrix,
            difficulty: dimension.saturating_sub(1).max(1),
        }
    }

    /// Build an instance from an explicit square matrix; row 0 is the depot
    pub fn from_matrix(name: &str, distance_matrix: Vec<Vec<f64>>) -> Result<Self, SearchError> {
        let dimension = distance_matrix.len();
        if dimension < 2 {
            return Err(SearchError::Parse("distance matrix needs a depot and one customer".into()));
        }
        if distance_matrix.iter().any(|row| row.len() != dimension) {
            return Err(SearchError::Parse("distance matrix is not square".into()));
        }

        Ok(RoutingInstance {
            name: name.to_string(),
            comment: String::new(),
            dimension,
            nodes: (0..dimension).map(|id| Node::new(id, 0.0, 0.0)).collect(),
            distance_matrix,
            difficulty: (dimension - 1).max(1),
        })
    }

    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty.max(1);
        self
    }

    /// Parse a TSP-LIB style file (`NAME`, `COMMENT`, `DIMENSION`, `NODE_COORD_SECTION`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let file = File::open(&path)?;
        let reader = BufReader::new(file);

        let mut name = String::new();
        let mut comment = String::new();
        let mut dimension = 0usize;
        let mut coords: Vec<(usize, f64, f64)> = Vec::new();
        let mut in_coords = false;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line == "EOF" {
                continue;
            }

            if let Some(rest) = line.strip_prefix("NAME") {
                name = rest.trim_start_matches([':', ' ']).trim().to_string();
                continue;
            }
            if let Some(rest) = line.strip_prefix("COMMENT") {
                comment = rest.trim_start_matches([':', ' ']).trim().to_string();
                continue;
            }
            if let Some(rest) = line.strip_prefix("DIMENSION") {
                dimension = rest
                    .trim_start_matches([':', ' '])
                    .trim()
                    .parse()
                    .map_err(|_| SearchError::Parse(format!("Invalid dimension: {}", line)))?;
                continue;
            }
            if line.starts_with("NODE_COORD_SECTION") {
                in_coords = true;
                continue;
            }
            if line.ends_with("_SECTION") || line.contains(':') {
                in_coords = false;
                continue;
            }

            if in_coords {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 3 {
                    let id: usize = parts[0]
                        .parse()
                        .map_err(|_| SearchError::Parse(format!("Invalid node id: {}", parts[0])))?;
                    let x: f64 = parts[1]
                        .parse()
                        .map_err(|_| {
                            SearchError::Parse(format!("Invalid x coordinate: {}", parts[1]))
                        })?;
                    let y: f64 = parts[2]
                        .parse()
                        .map_err(|_| {
                            SearchError::Parse(format!("Invalid y coordinate: {}", parts[2]))
                        })?;
                    coords.push((id, x, y));
                }
            }
        }

        if coords.len() < 2 {
            return Err(SearchError::Parse("instance needs at least two nodes".into()));
        }
        if dimension != 0 && dimension != coords.len() {
            return Err(SearchError::Parse(format!(
                "DIMENSION is {} but {} coordinates were read",
                dimension,
                coords.len()
            )));
        }

        coords.sort_by_key(|&(id, _, _)| id);
        let points: Vec<(f64, f64)> = coords.iter().map(|&(_, x, y)| (x, y)).collect();
        let mut instance = Self::from_coordinates(&name, &points);
        instance.comment = comment;
        Ok(instance)
    }

    fn compute_distance_matrix(nodes: &[Node]) -> Vec<Vec<f64>> {
        let n = nodes.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let dx = nodes[i].x - nodes[j].x;
                    let dy = nodes[i].y - nodes[j].y;
                    matrix[i][j] = (dx * dx + dy * dy).sqrt();
                }
            }
        }

        matrix
    }

    /// Length of the closed tour depot -> sequence -> depot
    pub fn tour_length(&self, sequence: &[usize]) -> f64 {
        if sequence.is_empty() {
            return 0.0;
        }
        let mut length = self.distance(0, sequence[0]);
        for pair in sequence.windows(2) {
            length += self.distance(pair[0], pair[1]);
        }
        length + self.distance(sequence[sequence.len() - 1], 0)
    }

    fn is_permutation(&self, sequence: &[usize]) -> bool {
        if sequence.len() != self.dimension - 1 {
            return false;
        }
        let mut seen = vec![false; self.dimension];
        for &node in sequence {
            if node == 0 || node >= self.dimension || seen[node] {
                return false;
            }
            seen[node] = true;
        }
        true
    }

    pub fn statistics(&self) -> InstanceStatistics {
        let mut total = 0.0;
        let mut max_distance: f64 = 0.0;
        let mut count = 0usize;
        for i in 0..self.dimension {
            for j in 0..self.dimension {
                if i != j {
                    total += self.distance_matrix[i][j];
                    max_distance = max_distance.max(self.distance_matrix[i][j]);
                    count += 1;
                }
            }
        }

        InstanceStatistics {
            name: self.name.clone(),
            n_jobs: self.dimension - 1,
            n_maintenance: 0,
            difficulty: self.difficulty,
            avg_distance: if count > 0 { total / count as f64 } else { 0.0 },
            max_distance,
        }
    }

    /// Depot plus the three other corners of the unit square
    #[cfg(test)]
    pub(crate) fn square() -> Self {
        Self::from_coordinates("square", &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])
    }

    /// Depot followed by `n` points evenly spread on a circle of radius 10
    #[cfg(test)]
    pub(crate) fn circle(n: usize) -> Self {
        let mut coords = vec![(10.0, 0.0)];
        for k in 1..=n {
            let angle = 2.0 * std::f64::consts::PI * k as f64 / (n + 1) as f64;
            coords.push((10.0 * angle.cos(), 10.0 * angle.sin()));
        }
        Self::from_coordinates("circle", &coords)
    }
}

impl Problem for RoutingInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn difficulty(&self) -> usize {
        self.difficulty
    }

    fn n_jobs(&self) -> usize {
        self.dimension - 1
    }

    #[inline]
    fn distance(&self, from: usize, to: usize) -> f64 {
        self.distance_matrix[from][to]
    }

    fn evaluate(&self, sequence: &[usize]) -> Evaluation {
        if !self.is_permutation(sequence) {
            // Unknown ids cannot be measured
            let measurable = sequence.iter().all(|&n| n < self.dimension);
            return Evaluation {
                cost: if measurable { self.tour_length(sequence) } else { f64::INFINITY },
                feasible: false,
            };
        }
        Evaluation {
            cost: self.tour_length(sequence),
            feasible: true,
        }
    }
}

/// A job of a [`MaintenanceInstance`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Processing time on a freshly maintained machine
    pub processing_time: f64,
    pub due_date: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Single machine sequencing with deterioration and maintenance slots.
///
/// Job ids are `1..=n_jobs`, maintenance slot ids are
/// `n_jobs+1..=n_jobs+n_maintenance`. A job's actual processing time is
/// `processing_time * (1 + deterioration)^k` where `k` is the number of jobs
/// run since the last maintenance. Maintenance takes `maintenance_time` and
/// returns the machine to the idle state 0, so setup times out of a
/// maintenance slot are read from row 0.
///
/// Cost is makespan plus total weighted tardiness. A sequence is feasible when
/// it is a permutation of all ids, does not start or end with maintenance,
/// never has two maintenance slots in a row and never runs more than
/// `max_run` consecutive jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceInstance {
    pub name: String,
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub n_maintenance: usize,
    #[serde(default)]
    pub maintenance_time: f64,
    #[serde(default)]
    pub deterioration: f64,
    #[serde(default)]
    pub max_run: Option<usize>,
    /// Setup times indexed by machine state, `(n_jobs + 1)` square, state 0 is idle
    pub setup_times: Vec<Vec<f64>>,
    #[serde(default)]
    pub difficulty: Option<usize>,
}

impl MaintenanceInstance {
    /// Load a JSON instance
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let file = File::open(&path)?;
        let instance: MaintenanceInstance = serde_json::from_reader(BufReader::new(file))?;
        instance.validate()?;
        Ok(instance)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        let n = self.jobs.len() + 1;
        if self.jobs.is_empty() {
            return Err(SearchError::Parse("instance has no jobs".into()));
        }
        if self.setup_times.len() != n || self.setup_times.iter().any(|row| row.len() != n) {
            return Err(SearchError::Parse(format!(
                "setup_times must be a {}x{} matrix",
                n, n
            )));
        }
        if self.deterioration < 0.0 || self.maintenance_time < 0.0 {
            return Err(SearchError::Parse(
                "deterioration and maintenance_time must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Random instance with uniform processing times, due dates and setups
    pub fn random(n_jobs: usize, n_maintenance: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let jobs: Vec<Job> = (0..n_jobs)
            .map(|_| Job {
                processing_time: rng.gen_range(1.0..10.0),
                due_date: rng.gen_range(5.0..(10.0 * n_jobs as f64 + 10.0)),
                weight: rng.gen_range(1.0..3.0),
            })
            .collect();

        let n = n_jobs + 1;
        let mut setup_times = vec![vec![0.0; n]; n];
        for (i, row) in setup_times.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                if i != j {
                    *cell = rng.gen_range(0.5..3.0);
                }
            }
        }

        MaintenanceInstance {
            name: format!("random-{}x{}-{}", n_jobs, n_maintenance, seed),
            jobs,
            n_maintenance,
            maintenance_time: 5.0,
            deterioration: 0.1,
            max_run: None,
            setup_times,
            difficulty: None,
        }
    }

    #[inline]
    fn is_maintenance(&self, id: usize) -> bool {
        id > self.jobs.len()
    }

    /// Machine state a node leaves behind
    #[inline]
    fn state(&self, id: usize) -> usize {
        if self.is_maintenance(id) {
            0
        } else {
            id
        }
    }

    fn is_feasible(&self, sequence: &[usize]) -> bool {
        let n = self.n_nodes();
        if sequence.len() != n {
            return false;
        }
        let mut seen: HashSet<usize> = HashSet::with_capacity(n);
        if !sequence.iter().all(|&id| id >= 1 && id <= n && seen.insert(id)) {
            return false;
        }
        if self.n_maintenance == 0 {
            return self.max_run.map_or(true, |max_run| n <= max_run);
        }
        if self.is_maintenance(sequence[0]) || self.is_maintenance(sequence[n - 1]) {
            return false;
        }

        let mut run = 0usize;
        let mut previous_was_maintenance = false;
        for &id in sequence {
            if self.is_maintenance(id) {
                if previous_was_maintenance {
                    return false;
                }
                previous_was_maintenance = true;
                run = 0;
            } else {
                previous_was_maintenance = false;
                run += 1;
                if self.max_run.is_some_and(|max_run| run > max_run) {
                    return false;
                }
            }
        }
        true
    }

    /// Makespan plus total weighted tardiness; ids outside the instance are skipped
    fn schedule_cost(&self, sequence: &[usize]) -> f64 {
        let mut time = 0.0;
        let mut age = 0i32;
        let mut state = 0usize;
        let mut tardiness = 0.0;

        for &id in sequence {
            if id == 0 || id > self.n_nodes() {
                continue;
            }
            if self.is_maintenance(id) {
                time += self.maintenance_time;
                age = 0;
                state = 0;
                continue;
            }
            let job = &self.jobs[id - 1];
            time += self.setup_times[state][id]
                + job.processing_time * (1.0 + self.deterioration).powi(age);
            tardiness += job.weight * (time - job.due_date).max(0.0);
            age += 1;
            state = id;
        }

        time + tardiness
    }

    pub fn statistics(&self) -> InstanceStatistics {
        let mut total = 0.0;
        let mut max_distance: f64 = 0.0;
        let mut count = 0usize;
        for (i, row) in self.setup_times.iter().enumerate() {
            for (j, &d) in row.iter().enumerate() {
                if i != j {
                    total += d;
                    max_distance = max_distance.max(d);
                    count += 1;
                }
            }
        }

        InstanceStatistics {
            name: self.name.clone(),
            n_jobs: self.jobs.len(),
            n_maintenance: self.n_maintenance,
            difficulty: self.difficulty(),
            avg_distance: if count > 0 { total / count as f64 } else { 0.0 },
            max_distance,
        }
    }

    /// Three jobs, no maintenance slot
    #[cfg(test)]
    pub(crate) fn three_jobs() -> Self {
        MaintenanceInstance {
            name: "three-jobs".to_string(),
            jobs: vec![
                Job { processing_time: 4.0, due_date: 4.0, weight: 1.0 },
                Job { processing_time: 2.0, due_date: 3.0, weight: 2.0 },
                Job { processing_time: 6.0, due_date: 20.0, weight: 1.0 },
            ],
            n_maintenance: 0,
            maintenance_time: 0.0,
            deterioration: 0.2,
            max_run: None,
            setup_times: vec![
                vec![0.0, 1.0, 1.0, 1.0],
                vec![1.0, 0.0, 2.0, 1.0],
                vec![1.0, 3.0, 0.0, 2.0],
                vec![1.0, 1.0, 1.0, 0.0],
            ],
            difficulty: None,
        }
    }
}

impl Problem for MaintenanceInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn difficulty(&self) -> usize {
        self.difficulty.unwrap_or(self.jobs.len()).max(1)
    }

    fn n_jobs(&self) -> usize {
        self.jobs.len()
    }

    fn n_maintenance(&self) -> usize {
        self.n_maintenance
    }

    #[inline]
    fn distance(&self, from: usize, to: usize) -> f64 {
        self.setup_times[self.state(from)][self.state(to)]
    }

    fn evaluate(&self, sequence: &[usize]) -> Evaluation {
        Evaluation {
            cost: self.schedule_cost(sequence),
            feasible: self.is_feasible(sequence),
        }
    }

    /// Shuffled jobs with the maintenance slots dropped into distinct gaps
    /// between jobs
    fn random_sequence<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let n_jobs = self.jobs.len();
        let mut jobs: Vec<usize> = (1..=n_jobs).collect();
        jobs.shuffle(rng);

        if self.n_maintenance == 0 {
            return jobs;
        }
        if n_jobs < self.n_maintenance + 1 {
            // Not enough gaps, no feasible layout exists
            let mut sequence = self.nodes();
            sequence.shuffle(rng);
            return sequence;
        }

        // Gap g sits after the g-th job
        let mut gaps: Vec<usize> = rand::seq::index::sample(rng, n_jobs - 1, self.n_maintenance)
            .into_iter()
            .map(|g| g + 1)
            .collect();
        gaps.sort_unstable();

        let mut sequence = Vec::with_capacity(self.n_nodes());
        let mut slot = n_jobs + 1;
        let mut next_gap = gaps.iter().peekable();
        for (i, job) in jobs.into_iter().enumerate() {
            sequence.push(job);
            if next_gap.peek() == Some(&&(i + 1)) {
                sequence.push(slot);
                slot += 1;
                next_gap.next();
            }
        }
        sequence
    }
}

/// Summary printed by the `analyze` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub n_jobs: usize,
    pub n_maintenance: usize,
    pub difficulty: usize,
    pub avg_distance: f64,
    pub max_distance: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Jobs/customers: {}", self.n_jobs)?;
        writeln!(f, "  Maintenance slots: {}", self.n_maintenance)?;
        writeln!(f, "  Difficulty: {}", self.difficulty)?;
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        writeln!(f, "  Max distance: {:.2}", self.max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_calculation() {
        let instance = RoutingInstance::from_coordinates("t", &[(0.0, 0.0), (3.0, 4.0)]);
        assert!((instance.distance(0, 1) - 5.0).abs() < 1e-10);
        assert!((instance.distance(1, 0) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_routing_from_json() {
        let matrix = vec![vec![0.0, 2.0, 4.0], vec![2.0, 0.0, 1.0], vec![4.0, 1.0, 0.0]];
        let instance = RoutingInstance::from_matrix("m", matrix).unwrap().with_difficulty(4);
        let json = serde_json::to_string(&instance).unwrap();
        let back: RoutingInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back.distance_matrix, instance.distance_matrix);
        assert_eq!(back.difficulty, 4);
        assert_eq!(back.evaluate(&[1, 2]).cost, 7.0);

        // Coordinates only: the matrix is rebuilt
        let json = r#"{"name": "c", "nodes": [
            {"id": 0, "x": 0, "y": 0},
            {"id": 1, "x": 3, "y": 4}
        ]}"#;
        let rebuilt: RoutingInstance = serde_json::from_str(json).unwrap();
        assert_eq!(rebuilt.dimension, 2);
        assert!((rebuilt.distance(0, 1) - 5.0).abs() < 1e-10);

        let ragged = r#"{"name": "r", "distance_matrix": [[0, 1], [1]]}"#;
        assert!(serde_json::from_str::<RoutingInstance>(ragged).is_err());
        assert!(serde_json::from_str::<RoutingInstance>(r#"{"name": "e"}"#).is_err());
    }

    #[test]
    fn test_routing_evaluation() {
        let instance = RoutingInstance::square();
        let around = instance.evaluate(&[1, 2, 3]);
        assert!(around.feasible);
        assert!((around.cost - 4.0).abs() < 1e-10);

        let crossed = instance.evaluate(&[2, 1, 3]);
        assert!(crossed.cost > around.cost);

        assert!(!instance.evaluate(&[1, 1, 3]).feasible);
        assert!(!instance.evaluate(&[1, 2]).feasible);
        assert!(instance.evaluate(&[1, 2, 9]).cost.is_infinite());
    }

    #[test]
    fn test_routing_from_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("metaheuristics-test-{}.tsp", std::process::id()));
        std::fs::write(
            &path,
            "NAME: tiny\nCOMMENT: test\nDIMENSION: 3\nEDGE_WEIGHT_TYPE: EUC_2D\n\
             NODE_COORD_SECTION\n1 0 0\n2 3 4\n3 0 4\nEOF\n",
        )
        .unwrap();

        let instance = RoutingInstance::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(instance.name, "tiny");
        assert_eq!(instance.dimension, 3);
        assert_eq!(instance.nodes(), vec![1, 2]);
        assert!((instance.distance(1, 2) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_from_matrix_rejects_ragged() {
        assert!(RoutingInstance::from_matrix("bad", vec![vec![0.0, 1.0], vec![1.0]]).is_err());
    }

    #[test]
    fn test_maintenance_cost() {
        let instance = MaintenanceInstance::three_jobs();
        // job 2: t = 1 + 2 = 3 (on time); job 1: t = 3 + 3 + 4*1.2 = 10.8, late 6.8;
        // job 3: t = 10.8 + 1 + 6*1.44 = 20.44, late 0.44
        let evaluation = instance.evaluate(&[2, 1, 3]);
        assert!(evaluation.feasible);
        assert!((evaluation.cost - (20.44 + 6.8 + 0.44)).abs() < 1e-9);
    }

    #[test]
    fn test_maintenance_feasibility() {
        let mut instance = MaintenanceInstance::random(4, 2, 3);
        // ids 5 and 6 are maintenance
        assert!(instance.evaluate(&[1, 5, 2, 6, 3, 4]).feasible);
        assert!(!instance.evaluate(&[5, 1, 2, 6, 3, 4]).feasible);
        assert!(!instance.evaluate(&[1, 2, 3, 5, 6, 4]).feasible);
        assert!(!instance.evaluate(&[1, 5, 2, 3, 4, 6]).feasible);

        instance.max_run = Some(2);
        assert!(instance.evaluate(&[1, 2, 5, 3, 6, 4]).feasible);

        instance.max_run = Some(1);
        assert!(!instance.evaluate(&[1, 2, 5, 3, 6, 4]).feasible);
    }

    #[test]
    fn test_maintenance_resets_state() {
        let instance = MaintenanceInstance::random(3, 1, 11);
        assert_eq!(instance.distance(4, 2), instance.setup_times[0][2]);
        assert_eq!(instance.distance(1, 4), instance.setup_times[1][0]);
    }

    #[test]
    fn test_maintenance_random_sequence_feasible() {
        let instance = MaintenanceInstance::random(6, 2, 5);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..20 {
            let sequence = instance.random_sequence(&mut rng);
            assert!(instance.evaluate(&sequence).feasible, "{:?}", sequence);
        }
    }

    #[test]
    fn test_maintenance_json_round() {
        let instance = MaintenanceInstance::three_jobs();
        let json = serde_json::to_string(&instance).unwrap();
        let back: MaintenanceInstance = serde_json::from_str(&json).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.n_nodes(), 3);
    }
}
