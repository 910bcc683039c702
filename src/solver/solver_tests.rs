use crate::auxiliary::spin::Spin;
use crate::solver::sector_without;

#[test]
fn test_solver_sector_without() {
    assert_eq!(sector_without((2, 1), Spin::Alpha), Some((1, 1)));
    assert_eq!(sector_without((2, 1), Spin::Beta), Some((2, 0)));
    assert_eq!(sector_without((0, 1), Spin::Alpha), None);
    assert_eq!(sector_without((3, 0), Spin::Beta), None);
}
