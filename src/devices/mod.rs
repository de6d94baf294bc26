
// Siglent SDS2000X Plus oscilloscopes.  If other instrument families are ever added, they get a sibling module here.
pub mod sds2000x;
