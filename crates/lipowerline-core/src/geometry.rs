//! GeoJSON helpers for structure points and derived span segments.

use geo::{GeodesicDistance, Point};
use geojson::{GeoJson, Geometry, Value as GeoJsonValue};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

/// Longitude/latitude of a GeoJSON `Point`. Anything else yields `None`.
pub fn point_coordinates(geojson: &str) -> Option<Coordinate> {
    let geometry = match geojson.parse::<GeoJson>().ok()? {
        GeoJson::Geometry(geometry) => geometry,
        GeoJson::Feature(feature) => feature.geometry?,
        GeoJson::FeatureCollection(_) => return None,
    };
    match geometry.value {
        GeoJsonValue::Point(position) if position.len() >= 2 => {
            let coordinate = Coordinate {
                lon: position[0],
                lat: position[1],
            };
            (coordinate.lon.is_finite() && coordinate.lat.is_finite()).then_some(coordinate)
        }
        _ => None,
    }
}

pub fn point_geojson(coordinate: Coordinate) -> String {
    GeoJson::from(Geometry::new(GeoJsonValue::Point(vec![
        coordinate.lon,
        coordinate.lat,
    ])))
    .to_string()
}

/// Two-vertex `LineString` between `start` and `end`.
pub fn segment_geojson(start: Coordinate, end: Coordinate) -> String {
    GeoJson::from(Geometry::new(GeoJsonValue::LineString(vec![
        vec![start.lon, start.lat],
        vec![end.lon, end.lat],
    ])))
    .to_string()
}

/// Length of the segment in metres, measured on the WGS84 ellipsoid
/// (Karney's geodesic), the same figure PostGIS gives for `geography`.
pub fn segment_length_m(start: Coordinate, end: Coordinate) -> f64 {
    Point::new(start.lon, start.lat).geodesic_distance(&Point::new(end.lon, end.lat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_point_geometry_and_feature() {
        let point = point_coordinates(r#"{"type":"Point","coordinates":[-47.9,-15.8]}"#);
        assert_eq!(point, Some(Coordinate { lon: -47.9, lat: -15.8 }));

        let feature = point_coordinates(
            r#"{"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1.0,2.0]}}"#,
        );
        assert_eq!(feature, Some(Coordinate { lon: 1.0, lat: 2.0 }));
    }

    #[test]
    fn non_points_have_no_coordinates() {
        assert!(point_coordinates(r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#).is_none());
        assert!(point_coordinates("not geojson").is_none());
    }

    #[test]
    fn lengths_are_measured_on_the_ellipsoid() {
        let equator = segment_length_m(
            Coordinate { lon: 0.0, lat: 0.0 },
            Coordinate { lon: 0.0, lat: 1.0 },
        );
        assert!((equator - 110_574.389).abs() < 0.01, "got {equator}");

        let brasilia = segment_length_m(
            Coordinate { lon: -47.0, lat: -15.0 },
            Coordinate { lon: -47.01, lat: -15.0 },
        );
        assert!((brasilia - 1_075.505).abs() < 0.01, "got {brasilia}");

        let north = segment_length_m(
            Coordinate { lon: 10.0, lat: 60.0 },
            Coordinate { lon: 10.0, lat: 60.01 },
        );
        assert!((north - 1_114.124).abs() < 0.01, "got {north}");
    }

    #[test]
    fn segment_is_a_two_vertex_linestring() {
        let text = segment_geojson(
            Coordinate { lon: 1.0, lat: 2.0 },
            Coordinate { lon: 3.0, lat: 4.0 },
        );
        let parsed: GeoJson = text.parse().expect("valid geojson");
        match parsed {
            GeoJson::Geometry(Geometry {
                value: GeoJsonValue::LineString(line),
                ..
            }) => assert_eq!(line, vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
            other => panic!("unexpected geometry {other:?}"),
        }
    }
}
