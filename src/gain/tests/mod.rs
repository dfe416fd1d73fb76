mod tests_log;
