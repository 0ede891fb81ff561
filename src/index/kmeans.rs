//! K-means clustering for the IVF index.
//!
//! Cosine similarity is the distance metric (input vectors are normalized,
//! so dot product suffices for assignment) and centroids are seeded with
//! K-means++ for faster convergence.

use rand::Rng;
use thiserror::Error;
use tracing::warn;

use crate::vector::{dot_similarity, normalize, normalize_in_place};

/// Maximum number of K-means iterations.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for centroid movement.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Result of a clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Unit-length cluster centroids.
    pub centroids: Vec<Vec<f32>>,
    /// Cluster index for each input vector, parallel to the input slice.
    pub assignments: Vec<u32>,
    /// Iterations until convergence.
    pub iterations: usize,
}

#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure vectors are added before training the index"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,

    #[error(
        "Failed to initialize centroids\nSuggestion: Check that vectors contain valid floating-point values"
    )]
    InitializationFailed,
}

/// Clusters `vectors` into `k` cells by cosine similarity.
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering(vectors: &[Vec<f32>], k: usize) -> Result<KMeansResult, ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut centroids = initialize_centroids(vectors, k)?;
    let mut assignments = vec![0u32; vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let new_assignments: Vec<u32> = vectors
            .iter()
            .map(|vector| nearest_centroid(vector, &centroids))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= MAX_ITERATIONS {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, k);
        let movement = centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if movement < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    if iterations >= MAX_ITERATIONS {
        // Partial convergence still yields a usable index
        warn!("k-means did not fully converge after {MAX_ITERATIONS} iterations");
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Index of the centroid most similar to `vector`.
pub fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> u32 {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = dot_similarity(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_cluster = i;
        }
    }

    best_cluster as u32
}

/// Indexes of the `nprobe` centroids most similar to `vector`, best first.
pub fn nearest_centroids(vector: &[f32], centroids: &[Vec<f32>], nprobe: usize) -> Vec<u32> {
    let mut scored: Vec<(u32, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(i, centroid)| (i as u32, dot_similarity(vector, centroid)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(nprobe.max(1));
    scored.into_iter().map(|(i, _)| i).collect()
}

fn update_centroids(vectors: &[Vec<f32>], assignments: &[u32], k: usize) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments.iter()) {
        let cluster = cluster as usize;
        for (i, &value) in vector.iter().enumerate() {
            new_centroids[cluster][i] += value;
        }
        cluster_sizes[cluster] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            // A cell that lost all members gets reseeded so k stays fixed
            let random_idx = rand::rng().random_range(0..vectors.len());
            *centroid = normalize(&vectors[random_idx]);
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
            normalize_in_place(centroid);
        }
    }

    new_centroids
}

/// K-means++ seeding: each new centroid is chosen with probability
/// proportional to its squared cosine distance from the nearest existing one.
fn initialize_centroids(vectors: &[Vec<f32>], k: usize) -> Result<Vec<Vec<f32>>, ClusteringError> {
    let mut rng = rand::rng();
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(normalize(&vectors[first_idx]));

    for _ in 1..k {
        let weights: Vec<f32> = vectors
            .iter()
            .map(|vector| {
                let nearest = centroids
                    .iter()
                    .map(|centroid| 1.0 - dot_similarity(vector, centroid))
                    .fold(f32::MAX, f32::min);
                nearest * nearest
            })
            .collect();
        let total: f32 = weights.iter().sum();

        if total < EPSILON {
            // Every remaining vector already sits on a centroid
            break;
        }

        // Weighted pick; rounding in the partial sums can leave the target
        // unreached, in which case the last vector absorbs it
        let target = rng.random::<f32>() * total;
        let mut cumulative = 0.0f32;
        let pick = weights
            .iter()
            .position(|&w| {
                cumulative += w;
                cumulative >= target
            })
            .unwrap_or(vectors.len() - 1);
        centroids.push(normalize(&vectors[pick]));
    }

    if centroids.len() != k {
        return Err(ClusteringError::InitializationFailed);
    }

    Ok(centroids)
}

fn centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(a, b)| 1.0 - dot_similarity(a, b))
        .sum::<f32>()
        / old.len() as f32
}
