//! Go extraction and normalization

mod common;

use codeindex_core::{ParseStatus, SymbolKind};
use common::{declaration_names, find, parse_normalized};
use pretty_assertions::assert_eq;

const POINT: &str = r#"package geometry

import "math"

// Point is a 2D point.
type Point struct {
	X, Y float64
}

// Norm returns the distance from the origin.
func (p *Point) Norm() float64 {
	return math.Sqrt(p.X*p.X + p.Y*p.Y)
}

func Origin() Point {
	return Point{}
}
"#;

#[test]
fn test_go_methods_are_scoped_by_receiver() {
    let (status, tree) = parse_normalized("geometry/point.go", POINT);

    assert_eq!(status, ParseStatus::Complete);
    assert_eq!(
        declaration_names(&tree),
        vec!["Point", "Point::Norm", "Origin"]
    );

    let norm = find(&tree, "Point::Norm");
    assert_eq!(norm.kind, SymbolKind::Method);
    assert_eq!(norm.receiver.as_deref(), Some("Point"));
    assert_eq!(
        norm.doc_comment.as_deref(),
        Some("Norm returns the distance from the origin.")
    );
    assert_eq!(norm.signature, "func (p *Point) Norm() float64");
}

#[test]
fn test_go_type_doc_comment() {
    let (_, tree) = parse_normalized("geometry/point.go", POINT);

    let point = find(&tree, "Point");
    assert_eq!(point.kind, SymbolKind::Type);
    assert_eq!(point.doc_comment.as_deref(), Some("Point is a 2D point."));
    assert!(find(&tree, "Origin").doc_comment.is_none());
}
