mod tests_requests;
