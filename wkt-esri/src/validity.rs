//! Contrôle de validité consultatif des géométries
//!
//! Les problèmes détectés sont remontés à l'appelant, qui les journalise.
//! Aucune géométrie n'est rejetée sur ce critère.

use geo::{Geometry, Intersects, Line, LineString, Polygon};

/// Problème de validité détecté sur une géométrie
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidityIssue {
    /// Anneau non fermé (premier point != dernier point)
    UnclosedRing { ring: usize },
    /// Anneau avec moins de 4 points
    DegenerateRing { ring: usize, points: usize },
    /// Segments non adjacents qui se croisent
    SelfIntersection { ring: usize },
    /// Ligne avec moins de 2 points
    DegeneratePath { path: usize, points: usize },
}

impl std::fmt::Display for ValidityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidityIssue::UnclosedRing { ring } => write!(f, "ring {} is not closed", ring),
            ValidityIssue::DegenerateRing { ring, points } => {
                write!(f, "ring {} has only {} points", ring, points)
            }
            ValidityIssue::SelfIntersection { ring } => {
                write!(f, "ring {} self-intersects", ring)
            }
            ValidityIssue::DegeneratePath { path, points } => {
                write!(f, "path {} has only {} points", path, points)
            }
        }
    }
}

/// Retourne la liste des problèmes de validité (vide si la géométrie est simple)
pub fn check(geom: &Geometry) -> Vec<ValidityIssue> {
    let mut issues = Vec::new();

    match geom {
        Geometry::Polygon(p) => check_polygon(p, 0, &mut issues),
        Geometry::MultiPolygon(mp) => {
            let mut offset = 0;
            for p in &mp.0 {
                check_polygon(p, offset, &mut issues);
                offset += 1 + p.interiors().len();
            }
        }
        Geometry::LineString(ls) => check_path(ls, 0, &mut issues),
        Geometry::MultiLineString(mls) => {
            for (i, ls) in mls.0.iter().enumerate() {
                check_path(ls, i, &mut issues);
            }
        }
        _ => {}
    }

    issues
}

fn check_polygon(p: &Polygon, offset: usize, issues: &mut Vec<ValidityIssue>) {
    let rings = std::iter::once(p.exterior()).chain(p.interiors().iter());
    for (i, ring) in rings.enumerate() {
        check_ring(ring, offset + i, issues);
    }
}

fn check_path(ls: &LineString, index: usize, issues: &mut Vec<ValidityIssue>) {
    if ls.0.len() < 2 {
        issues.push(ValidityIssue::DegeneratePath {
            path: index,
            points: ls.0.len(),
        });
    }
}

fn check_ring(ring: &LineString, index: usize, issues: &mut Vec<ValidityIssue>) {
    let coords = &ring.0;

    if coords.len() < 4 {
        issues.push(ValidityIssue::DegenerateRing {
            ring: index,
            points: coords.len(),
        });
        return;
    }

    if coords.first() != coords.last() {
        issues.push(ValidityIssue::UnclosedRing { ring: index });
        return;
    }

    if has_self_intersection(ring) {
        issues.push(ValidityIssue::SelfIntersection { ring: index });
    }
}

/// Test naïf O(n²) des segments non adjacents d'un anneau fermé
fn has_self_intersection(ring: &LineString) -> bool {
    let segments: Vec<Line> = ring.lines().collect();
    let n = segments.len();

    for i in 0..n {
        for j in (i + 2)..n {
            // Premier et dernier segments partagent le point de fermeture
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments[i].intersects(&segments[j]) {
                return true;
            }
        }
    }

    false
}
